use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by the host's send primitive.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// The raw send path of one connection, as provided by the host runtime.
///
/// Implementations do not have to tolerate concurrent writes; the
/// [`ConnectionWriter`](super::ConnectionWriter) owning a raw connection
/// serializes every call.
#[async_trait]
pub trait RawConnection: Send + 'static {
    /// Write one text frame to the peer.
    async fn send_text(&mut self, payload: &str) -> Result<(), ConnectionError>;

    /// Close the connection. Calling it on a closed connection is not an error.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}
