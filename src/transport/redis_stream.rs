use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::redis::{ExponentialBackoff, RedisPool};

use super::{BroadcastTransport, TransportError, SUBSCRIPTION_BUFFER};

const READ_BATCH: usize = 64;
const READ_BLOCK_MS: usize = 2000;
const CONSUMER_NAME: &str = "relay";

/// Redis Streams with one consumer group per process, so every process reads
/// its own copy of each entry.
pub struct RedisStreamTransport {
    pool: Arc<RedisPool>,
    /// Consumer group of this process
    group: String,
    max_len: usize,
}

impl RedisStreamTransport {
    pub fn new(pool: Arc<RedisPool>, group: impl Into<String>, max_len: usize) -> Self {
        Self {
            pool,
            group: group.into(),
            max_len,
        }
    }
}

#[async_trait]
impl BroadcastTransport for RedisStreamTransport {
    fn name(&self) -> &'static str {
        "redis-stream"
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let max_len = self.max_len;
        let entry_id = self
            .pool
            .execute(|mut conn| async move {
                // XADD topic MAXLEN ~ max_len * data payload
                let id: String = redis::cmd("XADD")
                    .arg(topic)
                    .arg("MAXLEN")
                    .arg("~")
                    .arg(max_len)
                    .arg("*")
                    .arg("data")
                    .arg(payload)
                    .query_async(&mut conn)
                    .await?;
                Ok::<_, RedisError>(id)
            })
            .await?;

        tracing::trace!(stream = %topic, entry_id = %entry_id, "Appended notification");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Vec<u8>>, TransportError> {
        let client = self.pool.client().clone();
        // Dedicated connection: blocking reads must not stall publishers
        let mut conn = client.get_multiplexed_tokio_connection().await?;
        create_group(&mut conn, topic, &self.group).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let consumer = StreamConsumer {
            client,
            stream: topic.to_string(),
            group: self.group.clone(),
        };
        tokio::spawn(consumer.run(conn, tx));

        tracing::info!(stream = %topic, group = %self.group, "Joined stream consumer group");
        Ok(rx)
    }
}

/// `XGROUP CREATE stream group $ MKSTREAM`; an existing group is fine.
async fn create_group(
    conn: &mut MultiplexedConnection,
    stream: &str,
    group: &str,
) -> RedisResult<()> {
    let created: RedisResult<String> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(stream)
        .arg(group)
        .arg("$")
        .arg("MKSTREAM")
        .query_async(conn)
        .await;

    match created {
        Ok(_) => Ok(()),
        Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
        Err(e) => Err(e),
    }
}

struct StreamConsumer {
    client: Client,
    stream: String,
    group: String,
}

impl StreamConsumer {
    async fn run(self, first: MultiplexedConnection, tx: mpsc::Sender<Vec<u8>>) {
        let mut backoff = ExponentialBackoff::new();
        let mut conn = Some(first);

        loop {
            let current = match conn.take() {
                Some(c) => Ok(c),
                None => self.reconnect().await,
            };

            let result = match current {
                Ok(mut c) => {
                    backoff.reset();
                    let result = self.read_loop(&mut c, &tx).await;
                    conn = Some(c);
                    result
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => break,
                Err(e) => {
                    conn = None;
                    let delay = backoff.next_delay();
                    tracing::error!(
                        stream = %self.stream,
                        group = %self.group,
                        error = %e,
                        retry_delay_ms = delay.as_millis() as u64,
                        "Stream consumer error, reconnecting"
                    );

                    tokio::select! {
                        _ = tx.closed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.destroy_group(conn).await;
    }

    async fn reconnect(&self) -> RedisResult<MultiplexedConnection> {
        let mut conn = self.client.get_multiplexed_tokio_connection().await?;
        create_group(&mut conn, &self.stream, &self.group).await?;
        Ok(conn)
    }

    /// `Ok` once the receiver is dropped.
    async fn read_loop(
        &self,
        conn: &mut MultiplexedConnection,
        tx: &mpsc::Sender<Vec<u8>>,
    ) -> RedisResult<()> {
        let options = StreamReadOptions::default()
            .group(&self.group, CONSUMER_NAME)
            .count(READ_BATCH)
            .block(READ_BLOCK_MS);

        loop {
            let read = tokio::select! {
                biased;
                _ = tx.closed() => return Ok(()),
                read = read_group(conn, &self.stream, &options) => read,
            };

            let reply = match read {
                Ok(Some(reply)) => reply,
                Ok(None) => continue,
                Err(e) if e.code() == Some("NOGROUP") => {
                    tracing::warn!(stream = %self.stream, group = %self.group, "Consumer group missing, recreating");
                    create_group(conn, &self.stream, &self.group).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            for key in reply.keys {
                for entry in key.ids {
                    match entry.get::<Vec<u8>>("data") {
                        Some(data) => {
                            if tx.send(data).await.is_err() {
                                return Ok(());
                            }
                        }
                        None => {
                            tracing::warn!(stream = %self.stream, entry_id = %entry.id, "Stream entry without data field");
                        }
                    }

                    let acked = conn.xack(&self.stream, &self.group, &[&entry.id]).await;
                    check_ack(acked, &self.stream, &self.group, &entry.id);
                }
            }
        }
    }

    async fn destroy_group(&self, conn: Option<MultiplexedConnection>) {
        let mut conn = match conn {
            Some(c) => c,
            None => match self.client.get_multiplexed_tokio_connection().await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(group = %self.group, error = %e, "Cannot reach Redis to destroy consumer group");
                    return;
                }
            },
        };

        let destroyed: RedisResult<i64> = redis::cmd("XGROUP")
            .arg("DESTROY")
            .arg(&self.stream)
            .arg(&self.group)
            .query_async(&mut conn)
            .await;

        match destroyed {
            Ok(_) => tracing::info!(stream = %self.stream, group = %self.group, "Consumer group destroyed"),
            Err(e) => tracing::warn!(stream = %self.stream, group = %self.group, error = %e, "Failed to destroy consumer group"),
        }
    }
}

async fn read_group(
    conn: &mut MultiplexedConnection,
    stream: &str,
    options: &StreamReadOptions,
) -> RedisResult<Option<StreamReadReply>> {
    conn.xread_options(&[stream], &[">"], options).await
}

/// Log an XACK that did not acknowledge the entry; it stays pending for the
/// group. Returns whether the entry was acknowledged.
fn check_ack(result: RedisResult<i64>, stream: &str, group: &str, entry_id: &str) -> bool {
    match result {
        Ok(n) if n > 0 => true,
        Ok(_) => {
            tracing::warn!(stream, group, entry_id, "XACK acknowledged nothing");
            false
        }
        Err(e) => {
            tracing::warn!(stream, group, entry_id, error = %e, "XACK failed");
            false
        }
    }
}
