//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    add_handler, clear_handler, cull_handler, decr_handler, decr_version_handler,
    delete_handler, delete_many_handler, get_handler, get_many_handler, has_key_handler,
    health_handler, incr_handler, incr_version_handler, set_handler, set_many_handler,
    stats_handler, touch_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router with all endpoints
    Router::new()
        .route("/set", put(set_handler))
        .route("/add", post(add_handler))
        .route("/get/:key", get(get_handler))
        .route("/get_many", post(get_many_handler))
        .route("/set_many", put(set_many_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/delete_many", post(delete_many_handler))
        .route("/has/:key", get(has_key_handler))
        .route("/incr/:key", post(incr_handler))
        .route("/decr/:key", post(decr_handler))
        .route("/incr_version/:key", post(incr_version_handler))
        .route("/decr_version/:key", post(decr_version_handler))
        .route("/touch/:key", post(touch_handler))
        .route("/clear", delete(clear_handler))
        .route("/cull", post(cull_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
