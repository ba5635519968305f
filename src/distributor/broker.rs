use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::metrics::DistributorMetrics;
use crate::transport::BroadcastTransport;

use super::{DistributorError, DistributorStrategy, OutboundMessage};

/// Publish/subscribe plumbing shared by the broker-backed strategies.
pub(super) struct BrokerLink {
    transport: Arc<dyn BroadcastTransport>,
    topic: String,
    publish_timeout: Duration,
}

impl BrokerLink {
    pub(super) fn new(
        transport: Arc<dyn BroadcastTransport>,
        topic: String,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            topic,
            publish_timeout,
        }
    }

    pub(super) fn topic(&self) -> &str {
        &self.topic
    }

    #[tracing::instrument(
        name = "distributor.publish",
        skip(self, strategy, message),
        fields(strategy = %strategy, topic = %self.topic, target = %message.target)
    )]
    pub(super) async fn publish(
        &self,
        strategy: DistributorStrategy,
        message: &OutboundMessage,
    ) -> Result<(), DistributorError> {
        let result = self.try_publish(message).await;

        match &result {
            Ok(()) => DistributorMetrics::record_published(strategy.as_str()),
            Err(e) => {
                DistributorMetrics::record_publish_failed(strategy.as_str());
                tracing::warn!(error = %e, transport = self.transport.name(), "Publish failed");
            }
        }

        result
    }

    async fn try_publish(&self, message: &OutboundMessage) -> Result<(), DistributorError> {
        let bytes = serde_json::to_vec(message)?;

        timeout(self.publish_timeout, self.transport.publish(&self.topic, bytes))
            .await
            .map_err(|_| DistributorError::Timeout(self.publish_timeout))??;

        Ok(())
    }

    pub(super) async fn subscribe(&self) -> Result<mpsc::Receiver<Vec<u8>>, DistributorError> {
        Ok(self.transport.subscribe(&self.topic).await?)
    }
}
