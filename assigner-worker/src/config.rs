use envconfig::Envconfig;

use assigner_common::config::{EnvMsDuration, NonEmptyString, PostgresConfig, RedisConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,

    /// Identity of this worker, injected by the orchestrator. Read once at startup.
    #[envconfig(from = "POD_NAME")]
    pub worker_name: NonEmptyString,

    #[envconfig(nested = true)]
    pub postgres: PostgresConfig,

    #[envconfig(nested = true)]
    pub redis: RedisConfig,

    #[envconfig(from = "TICK_INTERVAL_MS", default = "5000")]
    pub tick_interval: EnvMsDuration,

    #[envconfig(from = "STORE_TIMEOUT_MS", default = "1000")]
    pub store_timeout: EnvMsDuration,

    /// How long deregistration may take before the process exits anyway.
    #[envconfig(from = "SHUTDOWN_TIMEOUT_MS", default = "5000")]
    pub shutdown_timeout: EnvMsDuration,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
