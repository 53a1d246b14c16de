//! HTTP API for the directory
//!
//! - `/api/mixmining/...`: status submission, reports, registration, topology
//! - `/api/healthcheck`: liveness plus current node counts

pub mod error;
pub mod mixmining;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::DirectoryService;

pub use error::ApiError;
pub use mixmining::{create_router as create_mixmining_router, MixminingApiState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mix_nodes: usize,
    pub gateways: usize,
}

async fn healthcheck(State(service): State<Arc<DirectoryService>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        mix_nodes: service.current_mix_count(),
        gateways: service.current_gateway_count(),
    })
}

/// Full application router
pub fn create_app(service: Arc<DirectoryService>) -> Router {
    let mixmining = create_mixmining_router(MixminingApiState {
        service: service.clone(),
    });

    Router::new()
        .route("/api/healthcheck", get(healthcheck))
        .with_state(service)
        .nest("/api/mixmining", mixmining)
        .layer(TraceLayer::new_for_http())
}
