//! API route modules.

pub mod health;
pub mod logging;
pub mod tasks;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/tasks", tasks::router())
        .nest("/health", health::router())
        .nest("/logging", logging::router())
        .with_state(state)
}
