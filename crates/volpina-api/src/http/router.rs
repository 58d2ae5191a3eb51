//! Axum router configuration with middleware.
//!
//! Routes sit at the root, matching the paths existing chat clients call.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ping", get(ping))
        // Messages
        .route(
            "/messages",
            get(handlers::message::list_messages).post(handlers::message::append_message),
        )
        .route(
            "/messages/{id}",
            get(handlers::message::get_message).delete(handlers::message::delete_message),
        )
        .route("/messages/{id}/save", post(handlers::message::save_message))
        .route("/messages/{id}/unsave", post(handlers::message::unsave_message))
        // Conversations
        .route(
            "/conversations/{id}",
            delete(handlers::conversation::delete_conversation),
        )
        .route(
            "/conversation-last-time/{id}",
            get(handlers::conversation::last_activity),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe.
async fn ping() -> &'static str {
    "pong"
}
