//! API layer - HTTP endpoint handlers organized by domain.

mod health;
mod metrics;
mod publish;
mod routes;
mod sessions;

pub use health::{health, HealthResponse};
pub use metrics::prometheus_metrics;
pub use publish::{publish, PublishRequest, PublishResponse};
pub use routes::api_routes;
pub use sessions::{get_session, list_sessions, SessionDetailResponse, SessionsResponse};
