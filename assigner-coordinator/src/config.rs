use envconfig::Envconfig;

use assigner_common::config::{EnvMsDuration, PostgresConfig, RedisConfig};

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,

    #[envconfig(nested = true)]
    pub postgres: PostgresConfig,

    #[envconfig(nested = true)]
    pub redis: RedisConfig,

    #[envconfig(from = "TICK_INTERVAL_MS", default = "5000")]
    pub tick_interval: EnvMsDuration,

    // Bound on every single read or write against Postgres and Redis.
    #[envconfig(from = "STORE_TIMEOUT_MS", default = "1000")]
    pub store_timeout: EnvMsDuration,

    #[envconfig(from = "VIRTUAL_NODES", default = "10")]
    pub virtual_nodes: u32,

    #[envconfig(from = "SEED_RECORDS", default = "5")]
    pub seed_records: u32,

    // Start from an empty work_items table, dropping whatever a previous run left.
    #[envconfig(from = "RESET_RECORDS", default = "false")]
    pub reset_records: bool,

    // Workers that did not heartbeat for this long are evicted. 0 disables expiry and
    // leaves deregistration entirely to the workers.
    #[envconfig(from = "WORKER_LEASE_TTL_SECS", default = "0")]
    pub worker_lease_ttl_secs: u64,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
