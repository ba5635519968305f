//! In-memory connection pair, used where no socket exists (tests, embedding).

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{ConnectionError, RawConnection};

/// What the peer side of a [`ChannelConnection`] observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFrame {
    Text(String),
    Close,
}

/// Raw connection backed by an unbounded channel.
pub struct ChannelConnection {
    tx: mpsc::UnboundedSender<PeerFrame>,
    write_delay: Option<Duration>,
    failing: bool,
    closed: bool,
}

/// Receiving end of a [`ChannelConnection`].
pub struct ChannelPeer {
    rx: mpsc::UnboundedReceiver<PeerFrame>,
}

impl ChannelConnection {
    pub fn pair() -> (Self, ChannelPeer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                write_delay: None,
                failing: false,
                closed: false,
            },
            ChannelPeer { rx },
        )
    }

    /// Sleep before every write, simulating a slow consumer.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Every write fails.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

#[async_trait]
impl RawConnection for ChannelConnection {
    async fn send_text(&mut self, payload: &str) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(ConnectionError::SendFailed("write rejected".to_string()));
        }
        self.tx
            .send(PeerFrame::Text(payload.to_owned()))
            .map_err(|_| ConnectionError::Closed)
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        if !self.closed {
            self.closed = true;
            let _ = self.tx.send(PeerFrame::Close);
        }
        Ok(())
    }
}

impl ChannelPeer {
    /// Next frame, or `None` once the connection side is dropped.
    pub async fn recv(&mut self) -> Option<PeerFrame> {
        self.rx.recv().await
    }

    pub async fn recv_timeout(&mut self, limit: Duration) -> Option<PeerFrame> {
        tokio::time::timeout(limit, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Frames already delivered, without waiting.
    pub fn try_drain(&mut self) -> Vec<PeerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_then_close() {
        let (mut conn, mut peer) = ChannelConnection::pair();
        conn.send_text("hello").await.unwrap();
        conn.close().await.unwrap();
        conn.close().await.unwrap();

        assert_eq!(
            peer.try_drain(),
            vec![PeerFrame::Text("hello".into()), PeerFrame::Close]
        );
        assert!(matches!(
            conn.send_text("late").await,
            Err(ConnectionError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_failing_connection() {
        let (conn, _peer) = ChannelConnection::pair();
        let mut conn = conn.failing();
        assert!(matches!(
            conn.send_text("x").await,
            Err(ConnectionError::SendFailed(_))
        ));
    }
}
