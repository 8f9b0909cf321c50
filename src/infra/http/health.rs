use axum::Json;
use axum::extract::State;
use serde::Serialize;
use serde_json::{Value, json};

use crate::application::render::{PoolStatus, ReadinessState};
use crate::infra::http::HttpState;

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub version: &'static str,
    pub services: ServiceHealth,
}

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub renderer: ReadinessState,
    pub pool: PoolStatus,
}

pub async fn health(State(state): State<HttpState>) -> Json<HealthBody> {
    let backend = state.renderer.status();

    let status = match backend.state {
        ReadinessState::Ready => "ok",
        ReadinessState::Failed => "down",
        ReadinessState::Uninitialized | ReadinessState::Initializing => "degraded",
    };

    Json(HealthBody {
        status,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
        services: ServiceHealth {
            renderer: backend.state,
            pool: backend.pool,
        },
    })
}

pub async fn api_index(State(state): State<HttpState>) -> Json<Value> {
    let backend = state.renderer.status();

    Json(json!({
        "message": "Schemat Render Service API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /health",
            "POST /api/render-schematic",
            "POST /api/render-schematic-video",
        ],
        "status": {
            "renderer": backend.state,
        },
    }))
}
