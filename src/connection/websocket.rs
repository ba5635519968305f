use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;

use super::{ConnectionError, RawConnection};

/// Sending half of an axum WebSocket.
pub struct WebSocketSink {
    sink: SplitSink<WebSocket, Message>,
}

impl WebSocketSink {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl RawConnection for WebSocketSink {
    async fn send_text(&mut self, payload: &str) -> Result<(), ConnectionError> {
        self.sink
            .send(Message::Text(payload.to_owned().into()))
            .await
            .map_err(|e| ConnectionError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.sink
            .close()
            .await
            .map_err(|e| ConnectionError::SendFailed(e.to_string()))
    }
}
