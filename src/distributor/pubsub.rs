use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::session::SessionRegistry;
use crate::transport::BroadcastTransport;

use super::broker::BrokerLink;
use super::{
    Distributor, DistributorConfig, DistributorError, DistributorStrategy, LocalDelivery,
    OutboundMessage,
};

/// Emits each message on a fan-out channel that every process, the
/// publisher included, is subscribed to.
pub struct PubSubDistributor {
    link: BrokerLink,
    delivery: LocalDelivery,
}

impl PubSubDistributor {
    pub fn new(
        config: &DistributorConfig,
        registry: Arc<SessionRegistry>,
        transport: Arc<dyn BroadcastTransport>,
    ) -> Self {
        Self {
            link: BrokerLink::new(transport, config.channel.clone(), config.publish_timeout()),
            delivery: LocalDelivery::new(registry),
        }
    }

    pub fn channel(&self) -> &str {
        self.link.topic()
    }
}

#[async_trait]
impl Distributor for PubSubDistributor {
    fn strategy(&self) -> DistributorStrategy {
        DistributorStrategy::PubSub
    }

    fn delivery(&self) -> &LocalDelivery {
        &self.delivery
    }

    async fn publish(&self, message: OutboundMessage) -> Result<(), DistributorError> {
        self.link.publish(DistributorStrategy::PubSub, &message).await
    }

    async fn subscribe(&self) -> Result<Option<mpsc::Receiver<Vec<u8>>>, DistributorError> {
        let rx = self.link.subscribe().await?;
        tracing::info!(channel = %self.channel(), "Pub/sub distributor subscribed");
        Ok(Some(rx))
    }
}
