use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use super::handlers;
use crate::context::AgentContext;

pub fn build_router(context: Arc<AgentContext>) -> Router {
    let api = Router::new()
        .route("/sign", post(handlers::sign_pending))
        .route("/agent", get(handlers::agent_address));

    Router::new().nest("/api", api).with_state(context)
}
