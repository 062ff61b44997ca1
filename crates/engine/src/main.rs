//! Weft Engine Server
//!
//! Runs workflows over HTTP, persists pause state in PostgreSQL and sweeps
//! expired pauses in the background.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weft_engine::{
    config::{DatabaseConfig, EngineConfig},
    db::{create_pool, ensure_schema},
    handlers,
    hil::{ChannelRouter, LogNotifier, NatsNotifier, Notifier},
    state::{build_services, AppState},
    store::PgStore,
};
use weft_steps::{Builtins, TracingObserver};

/// Initialize tracing/logging.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,weft_engine=debug,weft_steps=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the application router with all routes.
fn build_router(state: AppState) -> Router {
    // CORS configuration - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    handlers::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Build the notifier: NATS for every channel when configured, with the log
/// as fallback.
async fn build_notifier(config: &EngineConfig) -> (Arc<dyn Notifier>, bool) {
    let log: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let Some(ref nats_url) = config.nats_url else {
        tracing::info!("NATS not configured, interaction notifications go to the log");
        return (log, false);
    };

    match NatsNotifier::connect(nats_url, &config.notify_subject).await {
        Ok(nats) => {
            let nats: Arc<dyn Notifier> = Arc::new(nats);
            let router = ChannelRouter::new()
                .with_channel("log", log)
                .with_fallback(nats);
            (Arc::new(router), true)
        }
        Err(e) => {
            tracing::warn!(error = %e, url = %nats_url, "Failed to connect to NATS, continuing without it");
            (log, false)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Weft Engine");

    let config = EngineConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load engine config, using defaults");
        EngineConfig::default()
    });

    let db_config = DatabaseConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load database config, using defaults");
        DatabaseConfig::default()
    });

    tracing::info!(
        host = %config.host,
        port = config.port,
        sweep_interval_secs = config.sweep_interval_secs,
        server_name = %config.server_name,
        "Configuration loaded"
    );

    // The engine cannot make progress without its store.
    let db_pool = create_pool(&db_config).await?;
    ensure_schema(&db_pool, &db_config.schema).await?;

    let (notifier, nats_connected) = build_notifier(&config).await;

    let services = build_services(
        Arc::new(PgStore::new(db_pool.clone())),
        notifier,
        Arc::new(TracingObserver),
        Builtins::default(),
        &config,
    );

    let shutdown = CancellationToken::new();
    let monitor_handle = services.monitor.clone().spawn(shutdown.clone());

    let state = AppState::new(services.engine, Some(db_pool), config.clone()).with_nats(nats_connected);
    let app = build_router(state);

    let addr: SocketAddr = config.bind_address().parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(address = %addr, "Server listening");

    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            token.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = monitor_handle.await {
        tracing::warn!(error = %e, "Timeout monitor task ended abnormally");
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
