//! API routes configuration

use crate::server::handlers;
use crate::server::state::AppState;
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// The web front-end's dev server
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Single allowed origin with credentials; methods and headers mirror the
/// preflight request. Requests from any other origin get no
/// `Access-Control-Allow-Origin` header.
pub fn cors_layer(origin: HeaderValue) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list([origin]))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState, cors_origin: HeaderValue) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/generate", post(handlers::generate))
        .route("/outputs", get(handlers::list_outputs))
        .route("/outputs/{filename}", get(handlers::serve_output))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
