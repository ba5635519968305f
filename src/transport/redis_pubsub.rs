use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::PubSub;
use redis::{Client, ErrorKind, RedisError};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::redis::{ExponentialBackoff, RedisPool};

use super::{BroadcastTransport, TransportError, SUBSCRIPTION_BUFFER};

/// Redis `PUBLISH`/`SUBSCRIBE`. At-most-once: a process that is not
/// subscribed at publish time never sees the message.
pub struct RedisPubSubTransport {
    pool: Arc<RedisPool>,
}

impl RedisPubSubTransport {
    pub fn new(pool: Arc<RedisPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BroadcastTransport for RedisPubSubTransport {
    fn name(&self) -> &'static str {
        "redis-pubsub"
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let receivers = self
            .pool
            .execute(|mut conn| async move {
                let n: i64 = redis::cmd("PUBLISH")
                    .arg(topic)
                    .arg(payload)
                    .query_async(&mut conn)
                    .await?;
                Ok::<_, RedisError>(n)
            })
            .await?;

        tracing::trace!(channel = %topic, receivers = receivers, "Published notification");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Vec<u8>>, TransportError> {
        let client = self.pool.client().clone();
        // First subscription is made before returning so errors reach the caller
        let pubsub = open_subscription(&client, topic).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(subscription_loop(client, topic.to_string(), pubsub, tx));

        tracing::info!(channel = %topic, "Subscribed to Redis channel");
        Ok(rx)
    }
}

async fn open_subscription(client: &Client, channel: &str) -> Result<PubSub, RedisError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    Ok(pubsub)
}

/// Forward messages until the receiver is dropped, reconnecting with backoff.
async fn subscription_loop(
    client: Client,
    channel: String,
    first: PubSub,
    tx: mpsc::Sender<Vec<u8>>,
) {
    let mut backoff = ExponentialBackoff::new();
    let mut pubsub = Some(first);

    loop {
        let current = match pubsub.take() {
            Some(p) => Ok(p),
            None => open_subscription(&client, &channel).await,
        };

        let result = match current {
            Ok(p) => {
                backoff.reset();
                forward(p, &tx).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => break,
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::error!(
                    channel = %channel,
                    error = %e,
                    retry_delay_ms = delay.as_millis() as u64,
                    "Redis subscription error, reconnecting"
                );

                tokio::select! {
                    _ = tx.closed() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    tracing::info!(channel = %channel, "Redis subscription stopped");
}

/// `Ok` when the receiver went away, `Err` when the connection did.
async fn forward(mut pubsub: PubSub, tx: &mpsc::Sender<Vec<u8>>) -> Result<(), RedisError> {
    let mut messages = pubsub.on_message();

    loop {
        tokio::select! {
            biased;

            _ = tx.closed() => return Ok(()),

            msg = messages.next() => match msg {
                Some(msg) => {
                    if tx.send(msg.get_payload_bytes().to_vec()).await.is_err() {
                        return Ok(());
                    }
                }
                None => {
                    return Err(RedisError::from((
                        ErrorKind::IoError,
                        "Redis message stream ended",
                    )));
                }
            }
        }
    }
}
