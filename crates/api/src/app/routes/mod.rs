use axum::{
    routing::{get, post},
    Router,
};

pub mod events;
pub mod retries;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/stats", get(system::stats))
        .route("/api/v1/events", post(events::ingest))
        .route("/api/v1/events/health", get(system::liveness))
        .route("/retries/:id", post(retries::retry_job))
}
