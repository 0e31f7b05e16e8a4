//! Register with the coordinator and process the work items assigned to this worker.
use std::sync::Arc;

use axum::Router;
use envconfig::Envconfig;
use eyre::{Result, WrapErr};

use assigner_common::coordination::RedisCoordinationStore;
use assigner_common::records::PgRecordStore;
use assigner_common::types::WorkerId;
use assigner_common::{handlers, metrics};
use assigner_worker::config::Config;
use assigner_worker::lifecycle::{Lifecycle, ShutdownSignal};
use assigner_worker::worker::AssignmentWorker;

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("starting assigner worker");

    let config = Config::init_from_env().wrap_err("failed to load configuration from env")?;
    let store_timeout = config.store_timeout.0;
    let worker_id = WorkerId::new(config.worker_name.as_str());

    let records = PgRecordStore::new(&config.postgres, store_timeout)
        .await
        .wrap_err("failed to connect to the record store")?;
    let coordination = Arc::new(
        RedisCoordinationStore::new(&config.redis, store_timeout)
            .await
            .wrap_err("failed to connect to the coordination store")?,
    );

    let recorder_handle =
        metrics::setup_metrics_recorder().wrap_err("failed to install metrics recorder")?;
    let app = handlers::app("assigner worker", Some(recorder_handle));

    // Installed before registering so a signal at any later point still deregisters.
    let mut shutdown =
        ShutdownSignal::install().wrap_err("failed to install shutdown signal handlers")?;

    let lifecycle = Lifecycle::new(worker_id, coordination.clone());
    lifecycle
        .register()
        .await
        .wrap_err("failed to register worker")?;

    let worker = AssignmentWorker::new(lifecycle, Arc::new(records), coordination);

    let result = tokio::select! {
        _ = shutdown.recv() => {
            tracing::info!("shutting down, deregistering worker");
            Ok(())
        }
        listen_result = listen(app, config.bind()) => {
            listen_result.wrap_err("worker http server failed")
        }
        _ = worker.run(config.tick_interval.0) => {
            Err(eyre::eyre!("worker loop exited"))
        }
    };

    worker
        .lifecycle()
        .deregister(config.shutdown_timeout.0)
        .await;

    result
}
