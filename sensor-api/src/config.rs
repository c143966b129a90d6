use clap::Parser;
use std::time::Duration;

/// Runtime settings, from flags or the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "sensor-api", about = "LAN ingestion and query API for CO2/temperature/humidity sensors")]
pub struct Config {
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://dropbop@localhost/sensor_data")]
    pub database_url: String,

    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:5001")]
    pub http_addr: String,

    /// Answer cross-origin requests from any origin.
    #[arg(long, env = "CORS_PERMISSIVE", default_value_t = true, action = clap::ArgAction::Set)]
    pub cors_permissive: bool,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub db_max_connections: u32,

    #[arg(long, env = "DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 10)]
    pub db_acquire_timeout_secs: u64,

    /// Create the readings/sensor_events tables if they do not exist.
    #[arg(long, env = "RUN_MIGRATIONS", default_value_t = true, action = clap::ArgAction::Set)]
    pub run_migrations: bool,
}

impl Config {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.db_acquire_timeout_secs)
    }

    /// Database target with credentials stripped, for logging.
    pub fn database_target(&self) -> &str {
        self.database_url
            .rsplit('@')
            .next()
            .unwrap_or("***")
    }
}
