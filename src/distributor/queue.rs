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

/// Appends each message to a broadcast topic. Each process reads the topic
/// through its own consumer group and so receives its own copy.
pub struct QueueDistributor {
    link: BrokerLink,
    delivery: LocalDelivery,
    instance_id: String,
}

impl QueueDistributor {
    /// `transport` must give each subscribing process an independent copy
    /// of the topic, e.g. a stream transport grouped by `instance_id`.
    pub fn new(
        config: &DistributorConfig,
        registry: Arc<SessionRegistry>,
        transport: Arc<dyn BroadcastTransport>,
    ) -> Self {
        Self {
            link: BrokerLink::new(transport, config.topic.clone(), config.publish_timeout()),
            delivery: LocalDelivery::new(registry),
            instance_id: config.instance_id.clone(),
        }
    }

    pub fn topic(&self) -> &str {
        self.link.topic()
    }
}

#[async_trait]
impl Distributor for QueueDistributor {
    fn strategy(&self) -> DistributorStrategy {
        DistributorStrategy::Queue
    }

    fn delivery(&self) -> &LocalDelivery {
        &self.delivery
    }

    async fn publish(&self, message: OutboundMessage) -> Result<(), DistributorError> {
        self.link.publish(DistributorStrategy::Queue, &message).await
    }

    async fn subscribe(&self) -> Result<Option<mpsc::Receiver<Vec<u8>>>, DistributorError> {
        let rx = self.link.subscribe().await?;
        tracing::info!(
            topic = %self.topic(),
            consumer_group = %self.instance_id,
            "Queue distributor consuming"
        );
        Ok(Some(rx))
    }
}
