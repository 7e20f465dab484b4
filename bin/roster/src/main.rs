//! Roster - keyset-paginated GraphQL read API.
//!
//! # Usage
//!
//! ```bash
//! # Start with default config
//! roster
//!
//! # Start with environment overrides
//! DATABASE_URL=postgres://localhost/roster CONTAINS_MODE=trigram roster
//! ```

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};

use roster_core::config::{DEFAULT_SIMILARITY_THRESHOLD, PaginationConfig};
use roster_core::metrics::init_metrics;
use roster_core::ports::{DEFAULT_PAGE_SIZE, ScopeExecutor};
use roster_core::query::ContainsStrategy;
use roster_graphql::{ServerConfig, build_schema, serve_with_shutdown};
use roster_storage::{Database, DatabaseConfig};

/// Roster CLI - education roster read API.
#[derive(Parser, Debug)]
#[command(name = "roster")]
#[command(about = "Roster - paginated users and organizations over GraphQL")]
#[command(version)]
struct Cli {
    /// PostgreSQL database URL.
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://localhost/roster")]
    database_url: String,

    /// GraphQL server port.
    #[arg(long, env = "GRAPHQL_PORT", default_value = "4000")]
    graphql_port: u16,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Run database migrations and exit.
    #[arg(long)]
    migrate_only: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// How the `contains` filter matches: substring or trigram.
    #[arg(long, env = "CONTAINS_MODE", default_value = "substring")]
    contains_mode: String,

    /// Minimum pg_trgm similarity for trigram `contains` (0.0 to 1.0).
    #[arg(long, env = "SIMILARITY_THRESHOLD", default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
    similarity_threshold: f64,

    /// Page size used when a request gives no count.
    #[arg(long, env = "DEFAULT_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    default_page_size: u32,

    /// Disable the GraphiQL playground.
    #[arg(long, env = "DISABLE_PLAYGROUND")]
    disable_playground: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled = match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>() {
        Ok(metrics_addr) => {
            match PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .install()
            {
                Ok(()) => {
                    init_metrics();
                    true
                }
                Err(e) => {
                    warn!("⚠️  Failed to start metrics exporter: {}. Continuing without metrics.", e);
                    false
                }
            }
        }
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            false
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting Roster");
    debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");

    let contains =
        PaginationConfig::contains_strategy(&cli.contains_mode, cli.similarity_threshold)
            .context("Invalid contains configuration")?;
    let pagination_config = PaginationConfig::new(cli.default_page_size, contains)
        .context("Invalid pagination configuration")?;
    debug!(
        default_page_size = pagination_config.default_page_size,
        contains = ?pagination_config.contains,
        "Pagination configured"
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────────
    info!("🗄️  Connecting to database...");
    {
        let migrations_db = Database::connect(&DatabaseConfig::for_migrations(&cli.database_url))
            .await
            .context("Failed to connect to database")?;
        migrations_db
            .migrate()
            .await
            .context("Failed to run migrations")?;
        migrations_db.close().await;
    }
    info!("🗄️  Database ready (migrations applied)");

    if cli.migrate_only {
        info!("🛑 --migrate-only flag set, exiting");
        return Ok(());
    }

    let db = Database::connect(&DatabaseConfig::for_graphql(&cli.database_url))
        .await
        .context("Failed to create GraphQL database pool")?;

    if matches!(contains, ContainsStrategy::Trigram { .. })
        && !db
            .has_trigram_extension()
            .await
            .context("Failed to check database extensions")?
    {
        bail!("CONTAINS_MODE=trigram requires the pg_trgm extension");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ SERVICES START
    // ─────────────────────────────────────────────────────────────────────────
    let executor: Arc<dyn ScopeExecutor> = Arc::new(db.executor());
    let schema = build_schema(executor, pagination_config);

    let graphql_config = ServerConfig {
        host: "0.0.0.0".to_string(),
        port: cli.graphql_port,
        enable_playground: !cli.disable_playground,
    };
    let graphql_port = cli.graphql_port;

    info!("✅ Roster ready");
    info!("   ⚡ GraphQL:  http://localhost:{}/graphql", graphql_port);
    if metrics_enabled {
        info!(
            "   📊 Metrics:  http://localhost:{}/metrics",
            cli.metrics_port
        );
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    let served = serve_with_shutdown(schema, graphql_config, shutdown_signal())
        .instrument(info_span!("graphql"))
        .await;
    if let Err(e) = &served {
        error!(error = %e, "❌ Server error");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────────
    info!("🛑 Shutting down...");
    db.close().await;
    info!("🛑 Shutdown complete");

    served.context("GraphQL server failed")
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://roster:secret@db:5432/roster"),
            "postgres://roster:****@db:5432/roster"
        );
        assert_eq!(mask_password("postgres://db/roster"), "postgres://db/roster");
        assert_eq!(mask_password("not a url"), "not a url");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["roster"]);
        assert_eq!(cli.graphql_port, 4000);
        assert_eq!(cli.contains_mode, "substring");
        assert_eq!(cli.similarity_threshold, DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(cli.default_page_size, DEFAULT_PAGE_SIZE);
    }
}
