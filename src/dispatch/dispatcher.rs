use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::metrics::InboundMetrics;
use crate::session::SessionKey;
use crate::websocket::ServerMessage;

/// The connection an inbound frame arrived on.
#[derive(Clone)]
pub struct InboundContext {
    pub connection: Arc<ConnectionHandle>,
    pub session_key: SessionKey,
}

impl InboundContext {
    pub fn new(connection: Arc<ConnectionHandle>, session_key: SessionKey) -> Self {
        Self {
            connection,
            session_key,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id
    }

    /// Reply to the sender only.
    pub fn reply(&self, message: &ServerMessage) {
        message.send_to(&self.connection);
    }
}

/// Handles frames of one `type`, deserialized into `M`.
#[async_trait]
pub trait FrameHandler<M>: Send + Sync
where
    M: DeserializeOwned + Send + 'static,
{
    async fn handle(&self, ctx: &InboundContext, message: M);
}

/// Receives the raw text of frames no typed handler accepted.
#[async_trait]
pub trait TextHandler: Send + Sync {
    async fn handle(&self, ctx: &InboundContext, raw: &str);
}

/// Why a frame could not be routed to a typed handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unroutable {
    Unparseable,
    MissingType,
    UnknownType(String),
    /// The frame did not match the handler's message shape
    InvalidShape(String),
}

impl fmt::Display for Unroutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unroutable::Unparseable => f.write_str("unparseable frame"),
            Unroutable::MissingType => f.write_str("missing type field"),
            Unroutable::UnknownType(t) => write!(f, "no handler for type '{}'", t),
            Unroutable::InvalidShape(t) => write!(f, "invalid shape for type '{}'", t),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled { message_type: String },
    Fallback(Unroutable),
    Dropped(Unroutable),
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Handled { .. } => "handled",
            DispatchOutcome::Fallback(_) => "fallback",
            DispatchOutcome::Dropped(_) => "dropped",
        }
    }
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn handle_value(&self, ctx: &InboundContext, value: Value) -> Result<(), serde_json::Error>;
}

struct Typed<M, H> {
    handler: H,
    _message: PhantomData<fn() -> M>,
}

#[async_trait]
impl<M, H> ErasedHandler for Typed<M, H>
where
    M: DeserializeOwned + Send + 'static,
    H: FrameHandler<M>,
{
    async fn handle_value(&self, ctx: &InboundContext, value: Value) -> Result<(), serde_json::Error> {
        let message = serde_json::from_value::<M>(value)?;
        self.handler.handle(ctx, message).await;
        Ok(())
    }
}

/// Static routing table from frame `type` to handler, built at startup.
#[derive(Default)]
pub struct InboundDispatcher {
    handlers: HashMap<String, Box<dyn ErasedHandler>>,
    fallback: Option<Arc<dyn TextHandler>>,
}

impl InboundDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route frames whose `type` is `message_type` to `handler`.
    pub fn register<M, H>(&mut self, message_type: &str, handler: H) -> &mut Self
    where
        M: DeserializeOwned + Send + 'static,
        H: FrameHandler<M> + 'static,
    {
        let typed = Typed {
            handler,
            _message: PhantomData,
        };
        if self
            .handlers
            .insert(message_type.to_string(), Box::new(typed))
            .is_some()
        {
            tracing::warn!(message_type = %message_type, "Handler replaced");
        }
        self
    }

    pub fn set_fallback(&mut self, handler: Arc<dyn TextHandler>) -> &mut Self {
        self.fallback = Some(handler);
        self
    }

    pub fn has_route(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    pub fn message_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Route one text frame. Never fails: frames that cannot be routed go
    /// to the fallback or are dropped.
    pub async fn dispatch(&self, ctx: &InboundContext, raw: &str) -> DispatchOutcome {
        let outcome = match self.route(ctx, raw).await {
            Ok(message_type) => DispatchOutcome::Handled { message_type },
            Err(reason) => self.unroutable(ctx, raw, reason).await,
        };

        InboundMetrics::record(outcome.label());
        outcome
    }

    async fn route(&self, ctx: &InboundContext, raw: &str) -> Result<String, Unroutable> {
        // Parsed once; the handler deserializes from this value
        let value: Value = serde_json::from_str(raw).map_err(|_| Unroutable::Unparseable)?;

        let message_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(Unroutable::MissingType)?
            .to_string();

        let handler = self
            .handlers
            .get(&message_type)
            .ok_or_else(|| Unroutable::UnknownType(message_type.clone()))?;

        if let Err(e) = handler.handle_value(ctx, value).await {
            tracing::debug!(
                connection_id = %ctx.connection_id(),
                message_type = %message_type,
                error = %e,
                "Frame does not match handler shape"
            );
            return Err(Unroutable::InvalidShape(message_type));
        }

        Ok(message_type)
    }

    async fn unroutable(&self, ctx: &InboundContext, raw: &str, reason: Unroutable) -> DispatchOutcome {
        match &self.fallback {
            Some(fallback) => {
                tracing::debug!(
                    connection_id = %ctx.connection_id(),
                    reason = %reason,
                    "Routing frame to fallback handler"
                );
                fallback.handle(ctx, raw).await;
                DispatchOutcome::Fallback(reason)
            }
            None => {
                tracing::warn!(
                    connection_id = %ctx.connection_id(),
                    reason = %reason,
                    len = raw.len(),
                    "Dropping unroutable frame"
                );
                DispatchOutcome::Dropped(reason)
            }
        }
    }
}
