//! Portico Server
//!
//! Identity subsystem of the Portico API gateway: registration, email
//! verification, password and Google sign-in, password reset, API client
//! keys and the internal machine API.
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings
//! portico-server
//!
//! # Start with custom config
//! portico-server --config /path/to/config.toml
//!
//! # Start with environment overrides
//! PORTICO__SERVER__PORT=8080 portico-server
//! ```

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use portico_api::{create_router, AppState};
use portico_auth::{AuthService, LogDelivery};
use portico_db::{Database, IdentityStore};

use crate::config::ServerConfig;

const DEV_JWT_SECRET: &str = "portico-development-secret-do-not-deploy";

// =============================================================================
// CLI Arguments
// =============================================================================

/// Portico identity server
#[derive(Parser, Debug)]
#[command(name = "portico-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "PORTICO_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "PORTICO_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORTICO_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PORTICO_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "PORTICO_LOG_FORMAT")]
    log_format: Option<String>,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// JWT signing secret
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Development mode: relaxed secret checks, codes and reset tokens logged
    #[arg(long, env = "PORTICO_DEV_MODE")]
    dev_mode: bool,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(url) = self.database_url {
            config.database.postgres_url = url;
        }
        if let Some(secret) = self.jwt_secret {
            config.auth.jwt.secret = secret;
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let dev_mode = args.dev_mode;

    let mut server_config = ServerConfig::load(args.config.as_deref(), dev_mode)?;
    args.apply(&mut server_config);

    init_logging(&server_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        dev_mode,
        "Starting Portico server"
    );

    validate_config(&mut server_config, dev_mode)?;

    let db = init_database(&server_config.database).await?;
    let store: Arc<dyn IdentityStore> = db;

    let delivery = Arc::new(LogDelivery::new(dev_mode));
    let auth = Arc::new(AuthService::new(
        store.clone(),
        delivery,
        server_config.auth.clone(),
    ));
    tracing::info!(
        allow_direct_registration = server_config.auth.registration.allow_direct,
        "Authentication service initialized"
    );

    let state = Arc::new(AppState::new(auth));
    let app = create_router(state, server_config.api.clone());

    if server_config.metrics.enabled {
        start_metrics_exporter(server_config.metrics.port)?;
    }

    spawn_purge_task(store, server_config.maintenance.purge_interval);

    let addr = server_config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        host = %server_config.server.host,
        port = server_config.server.port,
        "Server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging
fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => subscriber
            .with(fmt::layer().json().with_target(true))
            .try_init()?,
        _ => subscriber
            .with(fmt::layer().pretty().with_target(true))
            .try_init()?,
    }

    Ok(())
}

/// Validate configuration. Development mode downgrades problems to warnings.
fn validate_config(config: &mut ServerConfig, dev_mode: bool) -> anyhow::Result<()> {
    if dev_mode && config.auth.jwt.secret.is_empty() {
        tracing::warn!("JWT_SECRET not set, using the development secret");
        config.auth.jwt.secret = DEV_JWT_SECRET.to_string();
    }

    if let Err(problems) = config.auth.validate() {
        if !dev_mode {
            anyhow::bail!("Invalid auth configuration: {}", problems.join("; "));
        }
        for problem in problems {
            tracing::warn!(%problem, "Auth configuration relaxed in development mode");
        }
    }

    if !dev_mode && config.api.cors_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS allows any origin; set FRONTEND_URL to restrict it");
    }

    Ok(())
}

/// Connect, migrate and health check the database
async fn init_database(config: &config::DatabaseSettings) -> anyhow::Result<Arc<Database>> {
    let db = Database::connect(&config.to_db_config()).await?;

    if config.run_migrations {
        db.migrate().await?;
    }

    let health = db.health_check().await;
    if !health.healthy {
        anyhow::bail!("Database health check failed");
    }
    tracing::info!(postgres = health.postgres, "Database health check passed");

    Ok(Arc::new(db))
}

/// Install the Prometheus recorder with its own scrape listener
fn start_metrics_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(port, "Metrics exporter started");
    Ok(())
}

/// Periodically delete expired verification codes and spent reset tokens
fn spawn_purge_task(store: Arc<dyn IdentityStore>, every: Duration) {
    if every.is_zero() {
        tracing::debug!("Expired-row purge disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(stats) => tracing::debug!(
                    verification_codes = stats.verification_codes,
                    reset_tokens = stats.reset_tokens,
                    "Purged expired one-time secrets"
                ),
                Err(e) => tracing::warn!(error = %e, "Purge of expired one-time secrets failed"),
            }
        }
    });
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
