//! drop-gateway server entry point.
//!
//! Starts the Axum HTTP server and the expiry reaper.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use drop_gateway::config::{GatewayConfig, LogFormat};
use drop_gateway::domain::EventBus;
use drop_gateway::persistence::{CoordinationStore, MemoryStore, PostgresStore};
use drop_gateway::service::{ExpiryReaper, spawn_event_log};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env().context("loading configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting drop-gateway");

    // Build persistence layer
    let store: Arc<dyn CoordinationStore> = if config.persistence_enabled {
        Arc::new(
            PostgresStore::connect(&config)
                .await
                .context("connecting to postgres")?,
        )
    } else {
        tracing::warn!("persistence disabled, state is held in memory and lost on restart");
        Arc::new(MemoryStore::new())
    };

    // Build event layer
    let event_bus = EventBus::new(config.event_bus_capacity);
    if config.event_log_enabled {
        let _log = spawn_event_log(Arc::clone(&store), &event_bus);
    }

    // Start the reaper
    let cancel = CancellationToken::new();
    let reaper = Arc::new(ExpiryReaper::new(
        Arc::clone(&store),
        event_bus.clone(),
        config.lapse_policy,
        Duration::from_secs(config.reaper_interval_secs),
    ));
    let reaper_task = tokio::spawn(reaper.run(cancel.clone()));

    if config.internal_api_key.is_none() {
        tracing::warn!("INTERNAL_API_KEY not set, admin and callback routes will reject every call");
    }

    // Build router
    let state = drop_gateway::build_state(&config, store, &event_bus);
    let app = drop_gateway::build_app(state)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Err(e) = reaper_task.await {
        tracing::error!(error = %e, "reaper task failed");
    }
    tracing::info!("drop-gateway stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
