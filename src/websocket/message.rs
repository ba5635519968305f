use serde::{Deserialize, Serialize};

use crate::connection::ConnectionHandle;

/// Frames originated by the relay itself (replies to inbound frames)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Queue this frame on `connection`; failures are logged.
    pub fn send_to(&self, connection: &ConnectionHandle) {
        let json = match self.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize server message");
                return;
            }
        };

        if let Err(e) = connection.send(json) {
            tracing::debug!(connection_id = %connection.id, error = %e, "Reply not sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        assert_eq!(ServerMessage::Pong.to_json().unwrap(), r#"{"type":"pong"}"#);
        assert_eq!(
            ServerMessage::error("UNROUTABLE_FRAME", "no handler").to_json().unwrap(),
            r#"{"type":"error","code":"UNROUTABLE_FRAME","message":"no handler"}"#
        );
    }
}
