use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::StreamExt;

use crate::auth::{extract_token, Claims};
use crate::connection::WebSocketSink;
use crate::hub::{ConnectionSession, RealtimeHub};
use crate::server::AppState;
use crate::session::{HandshakeContext, SessionKey};

use super::ServerMessage;

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip_all)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let claims = match &state.jwt_validator {
        Some(validator) => {
            let Some(token) = extract_token(&query, &headers) else {
                return (StatusCode::UNAUTHORIZED, "Missing authentication token").into_response();
            };
            match validator.validate(&token) {
                Ok(claims) => Some(claims),
                Err(e) => {
                    tracing::warn!(error = %e, "JWT validation failed");
                    return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
                }
            }
        }
        None => None,
    };

    let ctx = handshake_context(query, &headers, claims);
    let key = match state.hub.session_key(&ctx) {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!(error = %e, "Session key could not be derived");
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    tracing::info!(session_key = %key, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, key))
}

fn handshake_context(
    query: HashMap<String, String>,
    headers: &HeaderMap,
    claims: Option<Claims>,
) -> HandshakeContext {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    HandshakeContext {
        query,
        headers,
        claims,
    }
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip(socket, state), fields(session_key = %key))]
async fn handle_socket(socket: WebSocket, state: AppState, key: SessionKey) {
    let (sink, mut stream) = socket.split();
    let session = state.hub.attach(WebSocketSink::new(sink), key);
    let connection = session.connection().clone();

    tracing::info!(connection_id = %connection.id, "WebSocket connection established");

    let hub = &state.hub;
    let session_ref = &session;
    let receive = async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, hub, session_ref).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    };

    // Ends on client close or when the writer gives up on the peer
    tokio::select! {
        _ = receive => {
            tracing::debug!(connection_id = %connection.id, "Receive loop completed");
        }
        _ = connection.closed() => {
            tracing::debug!(connection_id = %connection.id, "Writer closed");
        }
    }

    state.hub.on_connection_closed(session).await;

    tracing::info!(
        connection_id = %connection.id,
        duration_secs = connection.age_secs(),
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket message.
/// Returns false if the connection should be closed
async fn process_message(msg: Message, hub: &RealtimeHub, session: &ConnectionSession) -> bool {
    match msg {
        Message::Text(text) => {
            hub.on_text_frame(session, text.as_str()).await;
            true
        }
        Message::Binary(_) => {
            session.context().reply(&ServerMessage::error(
                "UNSUPPORTED_FORMAT",
                "Binary messages are not supported",
            ));
            true
        }
        // Pong replies are sent by the runtime
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %session.connection().id, "Received close frame");
            false
        }
    }
}
