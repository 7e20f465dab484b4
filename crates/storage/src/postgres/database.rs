//! PostgreSQL connection pool, migrations and extension checks.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use roster_core::error::{StorageError, StorageResult};

use super::executor::PgScopeExecutor;

/// Extension backing the trigram `contains` strategy.
pub const TRIGRAM_EXTENSION: &str = "pg_trgm";

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Connection acquisition timeout.
    pub acquire_timeout: Duration,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum connection lifetime.
    pub max_lifetime: Duration,
    /// Per-statement timeout; a runaway page query is cancelled server side.
    pub statement_timeout: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/roster".to_string(),
            max_connections: 15,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(900),
            statement_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl DatabaseConfig {
    /// Read-API defaults for `url`.
    pub fn for_graphql(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Short-lived pool for running migrations.
    pub fn for_migrations(url: &str) -> Self {
        Self {
            url: url.to_string(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
            statement_timeout: None,
            ..Default::default()
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database with the given configuration.
    #[instrument(skip_all)]
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        debug!(
            max_conn = config.max_connections,
            min_conn = config.min_connections,
            "Creating connection pool"
        );

        let statement_timeout = config.statement_timeout;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if let Some(timeout) = statement_timeout {
                        sqlx::query(&format!("SET statement_timeout = {}", timeout.as_millis()))
                            .execute(conn)
                            .await?;
                    }
                    Ok(())
                })
            })
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        debug!("Connection pool created");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Query executor sharing this pool.
    pub fn executor(&self) -> PgScopeExecutor {
        PgScopeExecutor::new(self)
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> StorageResult<()> {
        debug!("Running migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationError(e.to_string()))?;

        debug!("Migrations completed");

        Ok(())
    }

    /// Whether `pg_trgm` is installed, which trigram `contains` needs.
    #[instrument(skip(self))]
    pub async fn has_trigram_extension(&self) -> StorageResult<bool> {
        let installed: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = $1)")
                .bind(TRIGRAM_EXTENSION)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError(e.to_string()))?;

        if !installed {
            warn!(extension = TRIGRAM_EXTENSION, "Extension not installed");
        }
        Ok(installed)
    }

    /// Check if the database connection is healthy.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphql_config_keeps_url() {
        let config = DatabaseConfig::for_graphql("postgres://db/school");
        assert_eq!(config.url, "postgres://db/school");
        assert_eq!(config.statement_timeout, Some(Duration::from_secs(30)));
    }

    // Test critique: les migrations ne doivent pas être coupées par le timeout
    #[test]
    fn test_migration_config_has_no_statement_timeout() {
        let config = DatabaseConfig::for_migrations("postgres://db/school");
        assert_eq!(config.max_connections, 1);
        assert!(config.statement_timeout.is_none());
    }
}
