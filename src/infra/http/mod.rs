pub mod error;
mod health;
mod middleware;
mod render;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};

use crate::application::render::RenderService;

pub use middleware::RequestContext;

#[derive(Clone)]
pub struct HttpState {
    pub renderer: Arc<RenderService>,
    pub started_at: Instant,
    pub upload_limit_bytes: u64,
}

pub fn build_router(state: HttpState) -> Router {
    let body_limit = state.upload_limit_bytes as usize;

    Router::new()
        .route("/health", get(health::health))
        .route("/api", get(health::api_index))
        .route("/api/render-schematic", post(render::render_schematic))
        .route(
            "/api/render-schematic-video",
            post(render::render_schematic_video),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(middleware::log_responses))
        .layer(axum::middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}
