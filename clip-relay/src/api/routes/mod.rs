//! API route modules.

pub mod events;
pub mod health;
pub mod logging;
pub mod stats;
pub mod tenants;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/tenants", tenants::router())
        .nest("/api/stats", stats::router())
        .nest("/api/events", events::router())
        .nest("/api/logging", logging::router())
        .nest("/api/health", health::router())
        .with_state(state)
}
