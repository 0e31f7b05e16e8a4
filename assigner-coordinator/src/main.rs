//! Assign work items to the registered workers and keep the assignment current.
use std::sync::Arc;

use axum::Router;
use envconfig::Envconfig;
use eyre::{Result, WrapErr};
use futures::future::{select, Either};

use assigner_common::coordination::RedisCoordinationStore;
use assigner_common::records::PgRecordStore;
use assigner_common::{handlers, metrics};
use assigner_coordinator::bootstrap::bootstrap_records;
use assigner_coordinator::config::Config;
use assigner_coordinator::coordinator::{Coordinator, CoordinatorConfig};

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("starting assigner coordinator");

    let config = Config::init_from_env().wrap_err("failed to load configuration from env")?;
    let store_timeout = config.store_timeout.0;

    let records = PgRecordStore::new(&config.postgres, store_timeout)
        .await
        .wrap_err("failed to connect to the record store")?;
    bootstrap_records(&records, config.seed_records, config.reset_records)
        .await
        .wrap_err("failed to bootstrap the record store")?;

    let coordination = RedisCoordinationStore::new(&config.redis, store_timeout)
        .await
        .wrap_err("failed to connect to the coordination store")?;

    let coordinator = Coordinator::new(
        Arc::new(records),
        Arc::new(coordination),
        CoordinatorConfig {
            virtual_nodes: config.virtual_nodes,
            worker_lease_ttl_secs: config.worker_lease_ttl_secs,
        },
    );

    let recorder_handle =
        metrics::setup_metrics_recorder().wrap_err("failed to install metrics recorder")?;
    let app = handlers::app("assigner coordinator", Some(recorder_handle));
    let http_server = Box::pin(listen(app, config.bind()));
    let coordinator_loop = Box::pin(coordinator.run(config.tick_interval.0));

    match select(http_server, coordinator_loop).await {
        Either::Left((listen_result, _)) => {
            listen_result.wrap_err("coordinator http server failed")?;
        }
        Either::Right((_, _)) => {
            tracing::error!("coordinator loop exited")
        }
    };

    Ok(())
}
