//! Entry points the host runtime calls for each connection.
//!
//! `on_connection_opened` computes the session key and registers the
//! connection; `on_text_frame` routes inbound frames;
//! `on_connection_closed` unregisters and drains. Registration is also
//! removed when the [`ConnectionSession`] is dropped, so a cancelled
//! connection task cannot leave a stale entry.

use std::sync::Arc;

use crate::connection::{ConnectionHandle, ConnectionId, RawConnection, WriterConfig};
use crate::dispatch::{DispatchOutcome, InboundContext, InboundDispatcher};
use crate::metrics::ConnectionMetrics;
use crate::session::{
    HandshakeContext, HandshakeError, SessionKey, SessionKeyGenerator, SessionRegistry,
};

pub struct RealtimeHub {
    registry: Arc<SessionRegistry>,
    key_generator: Arc<dyn SessionKeyGenerator>,
    dispatcher: InboundDispatcher,
    writer_config: WriterConfig,
}

/// Removes the registry entry on drop.
struct RegistrationGuard {
    registry: Arc<SessionRegistry>,
    connection_id: ConnectionId,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.remove(self.connection_id);
    }
}

/// A registered connection, owned by the host's connection task.
pub struct ConnectionSession {
    context: InboundContext,
    _registration: RegistrationGuard,
}

impl ConnectionSession {
    pub fn connection(&self) -> &Arc<ConnectionHandle> {
        &self.context.connection
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.context.session_key
    }

    pub fn context(&self) -> &InboundContext {
        &self.context
    }
}

impl RealtimeHub {
    pub fn new(
        registry: Arc<SessionRegistry>,
        key_generator: Arc<dyn SessionKeyGenerator>,
        dispatcher: InboundDispatcher,
        writer_config: WriterConfig,
    ) -> Self {
        Self {
            registry,
            key_generator,
            dispatcher,
            writer_config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &InboundDispatcher {
        &self.dispatcher
    }

    /// Compute the session key for a handshake without registering anything.
    pub fn session_key(&self, ctx: &HandshakeContext) -> Result<SessionKey, HandshakeError> {
        self.key_generator.generate(ctx)
    }

    pub fn on_connection_opened(
        &self,
        raw: impl RawConnection,
        ctx: &HandshakeContext,
    ) -> Result<ConnectionSession, HandshakeError> {
        let key = self.session_key(ctx)?;
        Ok(self.attach(raw, key))
    }

    /// Register a connection whose key is already known.
    pub fn attach(&self, raw: impl RawConnection, key: SessionKey) -> ConnectionSession {
        let connection = ConnectionHandle::new(raw, self.writer_config.clone());
        let connection_id = connection.id;

        self.registry.add(connection.clone(), key.clone());
        ConnectionMetrics::record_opened();

        ConnectionSession {
            context: InboundContext::new(connection, key),
            _registration: RegistrationGuard {
                registry: self.registry.clone(),
                connection_id,
            },
        }
    }

    pub async fn on_text_frame(&self, session: &ConnectionSession, text: &str) -> DispatchOutcome {
        self.dispatcher.dispatch(&session.context, text).await
    }

    /// Unregister, then flush what is queued and close.
    pub async fn on_connection_closed(&self, session: ConnectionSession) {
        let connection = session.connection().clone();
        // Dropping the session removes the registry entry
        drop(session);

        connection.close().await;
        ConnectionMetrics::record_closed(connection.age_secs());
    }
}
