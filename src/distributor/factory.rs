//! Strategy selection at startup

use std::sync::Arc;

use crate::redis::RedisPool;
use crate::session::SessionRegistry;
use crate::transport::{BroadcastTransport, RedisPubSubTransport, RedisStreamTransport};

use super::{
    Distributor, DistributorConfig, DistributorStrategy, LocalDistributor, PubSubDistributor,
    QueueDistributor,
};

/// Create the configured distributor, backed by Redis for the broker
/// strategies. Falls back to local when no pool is available.
pub fn create_distributor(
    config: &DistributorConfig,
    registry: Arc<SessionRegistry>,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn Distributor> {
    if config.strategy == DistributorStrategy::Local {
        tracing::info!("Using local distributor");
        return Arc::new(LocalDistributor::new(registry));
    }

    let Some(pool) = redis_pool else {
        tracing::warn!(
            strategy = %config.strategy,
            "Redis pool not available, falling back to local distributor"
        );
        return Arc::new(LocalDistributor::new(registry));
    };

    let transport: Arc<dyn BroadcastTransport> = match config.strategy {
        DistributorStrategy::Queue => Arc::new(RedisStreamTransport::new(
            pool,
            config.instance_id.clone(),
            config.stream_max_len,
        )),
        _ => Arc::new(RedisPubSubTransport::new(pool)),
    };

    create_distributor_with_transport(config, registry, transport)
}

/// Create the configured distributor over an explicit transport.
pub fn create_distributor_with_transport(
    config: &DistributorConfig,
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn BroadcastTransport>,
) -> Arc<dyn Distributor> {
    tracing::info!(
        strategy = %config.strategy,
        transport = transport.name(),
        instance_id = %config.instance_id,
        "Creating distributor"
    );

    match config.strategy {
        DistributorStrategy::Local => Arc::new(LocalDistributor::new(registry)),
        DistributorStrategy::PubSub => {
            Arc::new(PubSubDistributor::new(config, registry, transport))
        }
        DistributorStrategy::Queue => Arc::new(QueueDistributor::new(config, registry, transport)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryBroker;

    fn config(strategy: DistributorStrategy) -> DistributorConfig {
        DistributorConfig {
            strategy,
            ..Default::default()
        }
    }

    #[test]
    fn test_broker_strategy_without_pool_falls_back() {
        let registry = Arc::new(SessionRegistry::new());
        let distributor =
            create_distributor(&config(DistributorStrategy::PubSub), registry, None);
        assert_eq!(distributor.strategy(), DistributorStrategy::Local);
    }

    #[test]
    fn test_strategy_follows_config() {
        let broker: Arc<dyn BroadcastTransport> = Arc::new(InMemoryBroker::new());
        for strategy in [
            DistributorStrategy::Local,
            DistributorStrategy::PubSub,
            DistributorStrategy::Queue,
        ] {
            let distributor = create_distributor_with_transport(
                &config(strategy),
                Arc::new(SessionRegistry::new()),
                broker.clone(),
            );
            assert_eq!(distributor.strategy(), strategy);
        }
    }
}
