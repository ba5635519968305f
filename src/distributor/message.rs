use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::session::SessionKey;

/// Which session keys a message is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Keys { keys: BTreeSet<SessionKey> },
    /// Every key known to the receiving process
    All,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Keys { keys } => write!(f, "keys({})", keys.len()),
            Target::All => f.write_str("all"),
        }
    }
}

/// A message to fan out. Serialized as-is onto the broker, so every
/// process consumes the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub payload: String,
    pub target: Target,
    /// Deliver to one live connection per key instead of all of them
    #[serde(default)]
    pub only_one_connection_per_key: bool,
}

impl OutboundMessage {
    pub fn to_keys<I, K>(keys: I, payload: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<SessionKey>,
    {
        Self {
            payload: payload.into(),
            target: Target::Keys {
                keys: keys.into_iter().map(Into::into).collect(),
            },
            only_one_connection_per_key: false,
        }
    }

    pub fn broadcast(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            target: Target::All,
            only_one_connection_per_key: false,
        }
    }

    pub fn one_per_key(mut self, enabled: bool) -> Self {
        self.only_one_connection_per_key = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let message = OutboundMessage::to_keys(["b", "a", "a"], "hi").one_per_key(true);
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "payload": "hi",
                "target": {"kind": "keys", "keys": ["a", "b"]},
                "only_one_connection_per_key": true
            })
        );
    }

    #[test]
    fn test_fan_out_mode_defaults_to_all_connections() {
        let message: OutboundMessage =
            serde_json::from_str(r#"{"payload":"x","target":{"kind":"all"}}"#).unwrap();
        assert_eq!(message, OutboundMessage::broadcast("x"));
        assert_eq!(message.target.to_string(), "all");
    }
}
