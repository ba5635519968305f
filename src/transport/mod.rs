//! Cross-process publish/subscribe bindings.
//!
//! The distributor needs only two operations from a broker: publish bytes on
//! a topic, and receive every byte payload published on a topic. Each
//! subscription gets its own copy of every message.

mod memory;
mod redis_pubsub;
mod redis_stream;

pub use memory::InMemoryBroker;
pub use redis_pubsub::RedisPubSubTransport;
pub use redis_stream::RedisStreamTransport;

use async_trait::async_trait;
use redis::RedisError;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::redis::PoolError;

/// Capacity of each subscription's receive buffer
pub const SUBSCRIPTION_BUFFER: usize = 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] PoolError),
}

#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Hand `payload` to the broker. Returns once the broker accepted it.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Start receiving payloads published on `topic`. The subscription ends
    /// when the returned receiver is dropped.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Vec<u8>>, TransportError>;
}
