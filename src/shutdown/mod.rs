//! Graceful shutdown of the relay.
//!
//! 1. Signals background tasks (notification listeners) to stop
//! 2. Closes every registered connection, letting each writer flush what it
//!    has queued within its send time limit
//! 3. Gives up on stragglers once the overall drain timeout elapses

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::session::SessionRegistry;

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Upper bound for draining all writers (default: 15 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShutdownResult {
    pub connections_total: usize,
    pub connections_closed: usize,
    /// False when the drain timeout cut the close phase short
    pub drained: bool,
    pub duration: Duration,
}

pub struct GracefulShutdown {
    registry: Arc<SessionRegistry>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(registry: Arc<SessionRegistry>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(registry, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        registry: Arc<SessionRegistry>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            registry,
            shutdown_tx,
            config,
        }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.registry.stats().total_connections)
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = Instant::now();

        tracing::info!(reason = %reason, "Starting graceful shutdown - signaling background tasks");
        // No receivers is fine: nothing is listening
        let _ = self.shutdown_tx.send(());

        let mut result = self.close_connections().await;
        result.duration = start.elapsed();

        tracing::info!(
            connections_total = result.connections_total,
            connections_closed = result.connections_closed,
            drained = result.drained,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    async fn close_connections(&self) -> ShutdownResult {
        let connections = self.registry.all_connections();
        let mut result = ShutdownResult {
            connections_total: connections.len(),
            drained: true,
            ..Default::default()
        };

        if connections.is_empty() {
            return result;
        }

        let mut closing: FuturesUnordered<_> = connections
            .into_iter()
            .map(|connection| async move {
                connection.close().await;
                connection.id
            })
            .collect();

        let closed = &mut result.connections_closed;
        let drain = async {
            while let Some(connection_id) = closing.next().await {
                tracing::debug!(connection_id = %connection_id, "Connection drained");
                *closed += 1;
            }
        };

        if timeout(self.config.drain_timeout, drain).await.is_err() {
            tracing::warn!(
                remaining = result.connections_total - result.connections_closed,
                timeout_ms = self.config.drain_timeout.as_millis() as u64,
                "Drain timeout elapsed; abandoning remaining connections"
            );
            result.drained = false;
        }

        result
    }
}
