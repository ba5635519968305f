//! Local session registry inspection.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::distributor::DeliveryStatsSnapshot;
use crate::error::{AppError, Result};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub instance_id: String,
    pub strategy: String,
    pub total_connections: usize,
    pub unique_keys: usize,
    pub delivery: DeliveryStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    pub session_key: String,
    pub connections: Vec<ConnectionInfo>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: u64,
    pub connected_at: DateTime<Utc>,
    pub open: bool,
}

/// GET /api/v1/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    let stats = state.registry.stats();

    Json(SessionsResponse {
        instance_id: state.settings.distributor.instance_id.clone(),
        strategy: state.distributor.strategy().to_string(),
        total_connections: stats.total_connections,
        unique_keys: stats.unique_keys,
        delivery: state.distributor.delivery().stats(),
    })
}

/// GET /api/v1/sessions/{key} - connections of one key on this instance
pub async fn get_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SessionDetailResponse>> {
    let connections = state.registry.connections_for(key.as_str());
    if connections.is_empty() {
        return Err(AppError::NotFound(format!(
            "No local connections for session key '{}'",
            key
        )));
    }

    Ok(Json(SessionDetailResponse {
        session_key: key,
        connections: connections
            .iter()
            .map(|c| ConnectionInfo {
                connection_id: c.id.as_u64(),
                connected_at: c.connected_at,
                open: c.is_open(),
            })
            .collect(),
    }))
}
