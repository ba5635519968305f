//! Built-in inbound frame handlers

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::InboundConfig;
use crate::distributor::{Distributor, OutboundMessage, Target};
use crate::session::SessionKey;
use crate::websocket::ServerMessage;

use super::{FrameHandler, InboundContext, InboundDispatcher, TextHandler};

/// `{"type":"ping"}`
#[derive(Debug, Deserialize)]
pub struct PingFrame {}

pub struct PingHandler;

#[async_trait]
impl FrameHandler<PingFrame> for PingHandler {
    async fn handle(&self, ctx: &InboundContext, _message: PingFrame) {
        ctx.reply(&ServerMessage::Pong);
    }
}

/// `{"type":"relay","to":["key",..],"payload":"..."}`; an empty `to` broadcasts.
#[derive(Debug, Deserialize)]
pub struct RelayFrame {
    #[serde(default)]
    pub to: BTreeSet<SessionKey>,
    pub payload: String,
    #[serde(default)]
    pub only_one_connection_per_key: Option<bool>,
}

/// Publishes client frames through the distributor.
pub struct RelayHandler {
    distributor: Arc<dyn Distributor>,
    default_one_per_key: bool,
}

impl RelayHandler {
    pub fn new(distributor: Arc<dyn Distributor>, default_one_per_key: bool) -> Self {
        Self {
            distributor,
            default_one_per_key,
        }
    }
}

#[async_trait]
impl FrameHandler<RelayFrame> for RelayHandler {
    async fn handle(&self, ctx: &InboundContext, message: RelayFrame) {
        let target = if message.to.is_empty() {
            Target::All
        } else {
            Target::Keys { keys: message.to }
        };
        let outbound = OutboundMessage {
            payload: message.payload,
            target,
            only_one_connection_per_key: message
                .only_one_connection_per_key
                .unwrap_or(self.default_one_per_key),
        };

        if let Err(e) = self.distributor.publish(outbound).await {
            tracing::warn!(
                connection_id = %ctx.connection_id(),
                session_key = %ctx.session_key,
                error = %e,
                "Relay publish failed"
            );
            ctx.reply(&ServerMessage::error("RELAY_FAILED", e.to_string()));
        }
    }
}

/// Answers unroutable frames with an `error` frame.
pub struct ErrorReplyFallback;

#[async_trait]
impl TextHandler for ErrorReplyFallback {
    async fn handle(&self, ctx: &InboundContext, _raw: &str) {
        ctx.reply(&ServerMessage::error(
            "UNROUTABLE_FRAME",
            "Frame has no registered handler or does not match its shape",
        ));
    }
}

/// Routing table used by the WebSocket endpoint.
pub fn build_dispatcher(
    config: &InboundConfig,
    distributor: Arc<dyn Distributor>,
    default_one_per_key: bool,
) -> InboundDispatcher {
    let mut dispatcher = InboundDispatcher::new();
    dispatcher.register::<PingFrame, _>("ping", PingHandler);

    if config.client_relay {
        dispatcher.register::<RelayFrame, _>(
            "relay",
            RelayHandler::new(distributor, default_one_per_key),
        );
    }
    if config.reply_on_unroutable {
        dispatcher.set_fallback(Arc::new(ErrorReplyFallback));
    }

    tracing::info!(message_types = ?dispatcher.message_types(), "Inbound dispatcher built");
    dispatcher
}
