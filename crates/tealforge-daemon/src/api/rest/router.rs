//! API Router configuration

use super::handlers;
use super::state::AppState;
use crate::config::ServerConfig;
use crate::error::DaemonResult;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, server: &ServerConfig) -> DaemonResult<Router> {
    let body_limit = server.body_limit_bytes()?;

    let mut router = Router::new()
        .route("/compile", post(handlers::compile))
        .route("/health", get(handlers::health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http());

    if server.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    Ok(router.with_state(state))
}
