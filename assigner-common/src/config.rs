use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use sqlx::postgres::PgConnectOptions;

/// Connection settings for the record store, read from the same variables the
/// Postgres container is configured with.
#[derive(Envconfig, Clone)]
pub struct PostgresConfig {
    #[envconfig(from = "POSTGRES_HOST", default = "localhost")]
    pub host: String,

    #[envconfig(from = "POSTGRES_PORT", default = "5432")]
    pub port: u16,

    #[envconfig(from = "POSTGRES_USER", default = "postgres")]
    pub user: String,

    #[envconfig(from = "POSTGRES_PASSWORD", default = "postgres")]
    pub password: String,

    #[envconfig(from = "POSTGRES_DB", default = "assigner")]
    pub database: String,

    #[envconfig(from = "MAX_PG_CONNECTIONS", default = "10")]
    pub max_connections: u32,
}

impl PostgresConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

#[derive(Envconfig, Clone)]
pub struct RedisConfig {
    #[envconfig(from = "REDIS_URL", default = "redis://redis-service:6379/")]
    pub url: String,

    /// Prefix of the registry and assignment keys.
    #[envconfig(from = "REDIS_KEY_PREFIX", default = "assigner")]
    pub key_prefix: NonEmptyString,
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}
