use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Fan-out mechanism, selected once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributorStrategy {
    /// Single process; publish delivers in-process
    #[default]
    Local,
    /// Broker fan-out channel, at-most-once
    PubSub,
    /// Broker topic with one consumer group per process
    Queue,
}

impl DistributorStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributorStrategy::Local => "local",
            DistributorStrategy::PubSub => "pubsub",
            DistributorStrategy::Queue => "queue",
        }
    }
}

impl fmt::Display for DistributorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributorConfig {
    #[serde(default)]
    pub strategy: DistributorStrategy,
    /// Identifies this process; also its consumer group under `queue`
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    /// Pub/sub channel
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Stream key used by the `queue` strategy
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_stream_max_len")]
    pub stream_max_len: usize,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    /// Applied when a publish request does not choose a fan-out mode
    #[serde(default)]
    pub only_one_connection_per_key: bool,
}

fn default_instance_id() -> String {
    format!("relay-{}", uuid::Uuid::new_v4().simple())
}

fn default_channel() -> String {
    "relay:fanout".to_string()
}

fn default_topic() -> String {
    "relay:fanout:stream".to_string()
}

fn default_stream_max_len() -> usize {
    10_000
}

fn default_publish_timeout_ms() -> u64 {
    3000
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            strategy: DistributorStrategy::default(),
            instance_id: default_instance_id(),
            channel: default_channel(),
            topic: default_topic(),
            stream_max_len: default_stream_max_len(),
            publish_timeout_ms: default_publish_timeout_ms(),
            only_one_connection_per_key: false,
        }
    }
}

impl DistributorConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}
