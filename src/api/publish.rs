//! HTTP publish endpoint.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::distributor::OutboundMessage;
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::session::SessionKey;

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub keys: Vec<SessionKey>,
    #[serde(default)]
    pub broadcast: bool,
    pub payload: String,
    /// Falls back to `distributor.only_one_connection_per_key`
    #[serde(default)]
    pub only_one_connection_per_key: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub accepted: bool,
    pub strategy: String,
    pub timestamp: DateTime<Utc>,
}

impl PublishRequest {
    /// Exactly one of a non-empty `keys` or `broadcast = true` must be given.
    pub fn into_message(self, default_one_per_key: bool) -> Result<OutboundMessage> {
        let message = match (self.keys.is_empty(), self.broadcast) {
            (false, false) => OutboundMessage::to_keys(self.keys, self.payload),
            (true, true) => OutboundMessage::broadcast(self.payload),
            (false, true) => {
                return Err(AppError::Validation(
                    "'keys' and 'broadcast' are mutually exclusive".to_string(),
                ))
            }
            (true, false) => {
                return Err(AppError::Validation(
                    "either non-empty 'keys' or 'broadcast: true' is required".to_string(),
                ))
            }
        };

        Ok(message.one_per_key(
            self.only_one_connection_per_key
                .unwrap_or(default_one_per_key),
        ))
    }
}

/// Publish a payload to session keys on every instance
#[tracing::instrument(
    name = "http.publish",
    skip(state, request),
    fields(key_count = request.keys.len(), broadcast = request.broadcast)
)]
pub async fn publish(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishResponse>)> {
    let message =
        request.into_message(state.settings.distributor.only_one_connection_per_key)?;

    state.distributor.publish(message).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            accepted: true,
            strategy: state.distributor.strategy().to_string(),
            timestamp: Utc::now(),
        }),
    ))
}
