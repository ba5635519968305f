use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::transport::TransportError;

use super::{DeliveryReport, DistributorStrategy, LocalDelivery, OutboundMessage};

#[derive(Debug, Error)]
pub enum DistributorError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),
}

/// Notifies every process of a published message so each can deliver to
/// its own connections.
#[async_trait]
pub trait Distributor: Send + Sync {
    fn strategy(&self) -> DistributorStrategy;

    fn delivery(&self) -> &LocalDelivery;

    /// Hand a message to the fan-out mechanism. Failures are returned, never
    /// retried here.
    async fn publish(&self, message: OutboundMessage) -> Result<(), DistributorError>;

    /// Deliver a message to this process's connections. Called by the
    /// transport binding once per process, the publisher included.
    fn on_notification(&self, message: &OutboundMessage) -> DeliveryReport {
        self.delivery().deliver(message)
    }

    /// Open the cross-process subscription, if this strategy has one.
    async fn subscribe(&self) -> Result<Option<mpsc::Receiver<Vec<u8>>>, DistributorError> {
        Ok(None)
    }
}
