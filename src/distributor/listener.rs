use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::metrics::DistributorMetrics;

use super::{decode_notification, Distributor, DistributorError};

/// Subscribe `distributor` to its broker and spawn the task that turns
/// received notifications into local deliveries. Returns `None` for
/// strategies without a subscription.
///
/// The subscription is open when this returns, so a publish made afterwards
/// by this process reaches its own connections.
pub async fn spawn_listener(
    distributor: Arc<dyn Distributor>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<Option<JoinHandle<()>>, DistributorError> {
    let Some(mut rx) = distributor.subscribe().await? else {
        return Ok(None);
    };

    let handle = tokio::spawn(async move {
        tracing::info!(strategy = %distributor.strategy(), "Notification listener started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("Notification listener received shutdown signal");
                    break;
                }

                received = rx.recv() => match received {
                    Some(bytes) => {
                        DistributorMetrics::record_received();
                        if let Some(message) = decode_notification(&bytes) {
                            distributor.on_notification(&message);
                        }
                    }
                    None => {
                        tracing::warn!("Notification subscription closed");
                        break;
                    }
                }
            }
        }
    });

    Ok(Some(handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributor::{DistributorConfig, LocalDistributor, PubSubDistributor};
    use crate::session::SessionRegistry;
    use crate::transport::{BroadcastTransport, TransportError};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct UnreachableBroker;

    #[async_trait]
    impl BroadcastTransport for UnreachableBroker {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn subscribe(&self, _topic: &str) -> Result<mpsc::Receiver<Vec<u8>>, TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails_startup() {
        let distributor: Arc<dyn Distributor> = Arc::new(PubSubDistributor::new(
            &DistributorConfig::default(),
            Arc::new(SessionRegistry::new()),
            Arc::new(UnreachableBroker),
        ));
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let result = spawn_listener(distributor, shutdown_rx).await;

        assert!(matches!(result, Err(DistributorError::Transport(_))));
    }

    #[tokio::test]
    async fn test_local_strategy_has_no_listener() {
        let distributor: Arc<dyn Distributor> =
            Arc::new(LocalDistributor::new(Arc::new(SessionRegistry::new())));
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = spawn_listener(distributor, shutdown_rx).await.unwrap();

        assert!(handle.is_none());
    }
}
