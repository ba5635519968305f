use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use session_relay::config::Settings;
use session_relay::distributor::{spawn_listener, DistributorStrategy};
use session_relay::redis::RedisPool;
use session_relay::server::{create_app, AppState};
use session_relay::shutdown::GracefulShutdown;
use session_relay::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;
    init_tracing(&settings.logging);
    tracing::info!(
        instance_id = %settings.distributor.instance_id,
        strategy = %settings.distributor.strategy,
        "Configuration loaded"
    );

    let redis_pool = if settings.distributor.strategy == DistributorStrategy::Local {
        None
    } else {
        let pool = Arc::new(RedisPool::new(&settings.redis.url)?);
        if let Err(e) = pool.ping().await {
            // spawn_listener below fails startup if the subscription cannot open
            tracing::warn!(error = %e, "Redis not reachable at startup");
        }
        Some(pool)
    };

    let state = AppState::new(settings.clone(), redis_pool);
    tracing::info!("Application state initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let listener_handle = spawn_listener(state.distributor.clone(), shutdown_tx.subscribe()).await?;

    let shutdown = GracefulShutdown::new(state.registry.clone(), shutdown_tx);
    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown))
        .await?;

    if let Some(handle) = listener_handle {
        tracing::info!("Waiting for notification listener to finish...");
        let _ = handle.await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown: GracefulShutdown) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let reason = tokio::select! {
        _ = ctrl_c => "ctrl_c",
        _ = terminate => "terminate",
    };
    tracing::info!(reason = reason, "Received signal, initiating graceful shutdown");

    shutdown.execute(reason).await;
}

