use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn feedback_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(handlers::list_feedback).post(handlers::create_feedback))
        .route("/{feedback_id}", get(handlers::get_feedback).delete(handlers::delete_feedback))
        .route("/{feedback_id}/status", patch(handlers::update_feedback_status))
        .route("/{feedback_id}/visibility", patch(handlers::update_feedback_visibility))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
