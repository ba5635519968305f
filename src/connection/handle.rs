use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{ConnectionId, ConnectionWriter, RawConnection, SendOutcome, WriterConfig, WriterError};

/// A live connection as seen by the registry and the distributor.
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub connected_at: DateTime<Utc>,
    writer: ConnectionWriter,
}

impl ConnectionHandle {
    /// Wrap a raw connection in a writer; must be called inside a Tokio runtime.
    pub fn new(raw: impl RawConnection, config: WriterConfig) -> Arc<Self> {
        let id = ConnectionId::next();
        Arc::new(Self {
            id,
            connected_at: Utc::now(),
            writer: ConnectionWriter::spawn(id, Box::new(raw), config),
        })
    }

    pub fn send(&self, payload: impl Into<Arc<str>>) -> Result<SendOutcome, WriterError> {
        self.writer.send(payload)
    }

    pub fn writer(&self) -> &ConnectionWriter {
        &self.writer
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_open()
    }

    /// Drain and close; see [`ConnectionWriter::close`].
    pub async fn close(&self) {
        self.writer.close().await
    }

    pub async fn closed(&self) {
        self.writer.closed().await
    }

    pub fn age_secs(&self) -> f64 {
        (Utc::now() - self.connected_at).num_milliseconds() as f64 / 1000.0
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("state", &self.writer.state())
            .finish()
    }
}
