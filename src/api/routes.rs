use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::health;
use super::metrics::prometheus_metrics;
use super::publish::publish;
use super::sessions::{get_session, list_sessions};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                .route("/publish", post(publish))
                .route("/sessions", get(list_sessions))
                .route("/sessions/{key}", get(get_session)),
        )
}
