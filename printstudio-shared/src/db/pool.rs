/// Postgres pool for usage profiles and usage events
///
/// # Example
///
/// ```no_run
/// use printstudio_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::new(std::env::var("DATABASE_URL")?).with_max_connections(20)).await?;
/// # Ok(())
/// # }
/// ```

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,

    /// Bounds how long a quota check can wait on a saturated or dead pool
    pub acquire_timeout: Duration,

    pub idle_timeout: Option<Duration>,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        DatabaseConfig {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Connects and verifies the database answers
pub async fn create_pool(config: DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    info!(
        max_connections = config.max_connections,
        acquire_timeout_ms = config.acquire_timeout.as_millis() as u64,
        "Connecting to database"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(&config.url)
        .await?;

    health_check(&pool).await?;

    info!("Database pool ready");
    Ok(pool)
}

/// Round-trips a trivial query
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    debug!("Database health check passed");
    Ok(())
}

pub async fn close_pool(pool: PgPool) {
    info!("Closing database pool");
    pool.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::new("postgresql://localhost/printstudio");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_max_connections_never_zero() {
        let config = DatabaseConfig::new("postgresql://localhost/printstudio").with_max_connections(0);
        assert_eq!(config.max_connections, 1);
        assert!(config.min_connections <= config.max_connections);
    }
}
