use async_trait::async_trait;
use std::sync::Arc;

use crate::metrics::DistributorMetrics;
use crate::session::SessionRegistry;

use super::{Distributor, DistributorError, DistributorStrategy, LocalDelivery, OutboundMessage};

/// Single-process strategy: publish delivers synchronously in-process.
pub struct LocalDistributor {
    delivery: LocalDelivery,
}

impl LocalDistributor {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            delivery: LocalDelivery::new(registry),
        }
    }
}

#[async_trait]
impl Distributor for LocalDistributor {
    fn strategy(&self) -> DistributorStrategy {
        DistributorStrategy::Local
    }

    fn delivery(&self) -> &LocalDelivery {
        &self.delivery
    }

    #[tracing::instrument(
        name = "distributor.publish",
        skip(self, message),
        fields(strategy = "local", target = %message.target)
    )]
    async fn publish(&self, message: OutboundMessage) -> Result<(), DistributorError> {
        self.on_notification(&message);
        DistributorMetrics::record_published(DistributorStrategy::Local.as_str());
        Ok(())
    }
}
