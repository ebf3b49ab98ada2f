use axum::{routing::get, Router};

pub mod jobs;
pub mod system;

/// Router for all versioned API endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/api/v1/jobs", jobs::router())
}
