//! Mixmining API Endpoints
//!
//! Status submission, reports, registration and topology. Status submission
//! and reputation overrides are only accepted from the loopback interface,
//! where the network monitor runs.

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use crate::api::error::ApiError;
use crate::error::DirectoryError;
use crate::models::{
    BatchNodeStatus, BatchStatusReport, GatewayRegistrationInfo, MixRegistrationInfo, NodeState,
    NodeStatus, Observation, RegisteredNode, StatusReport, Topology,
};
use crate::sanitize::{sanitize_str, Sanitizable};
use crate::service::DirectoryService;

/// API state for mixmining endpoints
#[derive(Clone)]
pub struct MixminingApiState {
    pub service: Arc<DirectoryService>,
}

#[derive(Debug, Deserialize)]
pub struct ReputationQuery {
    pub reputation: i64,
}

#[derive(Debug, Serialize)]
pub struct UnregisterResponse {
    pub identity: String,
    pub was: NodeState,
}

#[derive(Debug, Serialize)]
pub struct BatchReputationResponse {
    pub requested: usize,
    pub updated: u64,
}

fn require_loopback(addr: &SocketAddr, path: &str) -> Result<(), ApiError> {
    if addr.ip().to_canonical().is_loopback() {
        Ok(())
    } else {
        warn!(caller = %addr, path = %path, "Rejected non-local request");
        Err(ApiError::forbidden("only accepted from localhost"))
    }
}

fn clean_identity(raw: &str) -> Result<String, ApiError> {
    let identity = sanitize_str(raw);
    if identity.is_empty() {
        return Err(DirectoryError::InvalidInput("empty node identity".to_string()).into());
    }
    Ok(identity)
}

// Endpoints

/// POST / - Record one status observation
pub async fn create_status(
    State(state): State<MixminingApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(mut status): Json<NodeStatus>,
) -> Result<(StatusCode, Json<StatusReport>), ApiError> {
    require_loopback(&addr, "/")?;
    status.sanitize();
    let report = state.service.submit_observation(status).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// POST /batch - Record a batch of status observations
pub async fn batch_create_status(
    State(state): State<MixminingApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(mut batch): Json<BatchNodeStatus>,
) -> Result<(StatusCode, Json<BatchStatusReport>), ApiError> {
    require_loopback(&addr, "/batch")?;
    batch.sanitize();
    let reports = state.service.submit_observation_batch(batch).await?;
    Ok((StatusCode::CREATED, Json(reports)))
}

/// GET /node/{pubkey}/history - Raw observations, newest first
pub async fn list_history(
    State(state): State<MixminingApiState>,
    Path(pubkey): Path<String>,
) -> Result<Json<Vec<Observation>>, ApiError> {
    let identity = clean_identity(&pubkey)?;
    Ok(Json(state.service.list_observations(&identity).await))
}

/// GET /node/{pubkey}/report - Current status report
pub async fn get_report(
    State(state): State<MixminingApiState>,
    Path(pubkey): Path<String>,
) -> Result<Json<StatusReport>, ApiError> {
    let identity = clean_identity(&pubkey)?;
    let report = state.service.get_report(&identity).await;
    if report.is_empty() {
        return Err(DirectoryError::NotFound(format!("no report for {}", identity)).into());
    }
    Ok(Json(report))
}

/// GET /fullreport - Every report with uptime in the last day
pub async fn full_report(State(state): State<MixminingApiState>) -> Json<BatchStatusReport> {
    Json(state.service.get_non_stale_report_batch().await)
}

/// POST /register/mix
pub async fn register_mix(
    State(state): State<MixminingApiState>,
    Json(mut info): Json<MixRegistrationInfo>,
) -> Result<(StatusCode, Json<RegisteredNode>), ApiError> {
    info.sanitize();
    let node = state.service.register_mix(info).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// POST /register/gateway
pub async fn register_gateway(
    State(state): State<MixminingApiState>,
    Json(mut info): Json<GatewayRegistrationInfo>,
) -> Result<(StatusCode, Json<RegisteredNode>), ApiError> {
    info.sanitize();
    let node = state.service.register_gateway(info).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// DELETE /register/{id} - Self-service unregistration from the node's host
pub async fn unregister(
    State(state): State<MixminingApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
) -> Result<Json<UnregisterResponse>, ApiError> {
    let identity = clean_identity(&id)?;
    let caller = addr.ip().to_string();
    let was = state.service.unregister_node(&identity, &caller).await?;
    Ok(Json(UnregisterResponse { identity, was }))
}

/// GET /topology
pub async fn topology(State(state): State<MixminingApiState>) -> Json<Arc<Topology>> {
    Json(state.service.get_topology().await)
}

/// GET /topology/active - Nodes at or above the reputation threshold
pub async fn active_topology(State(state): State<MixminingApiState>) -> Json<Arc<Topology>> {
    Json(state.service.get_active_topology().await)
}

/// GET /topology/removed
pub async fn removed_topology(State(state): State<MixminingApiState>) -> Json<Arc<Topology>> {
    Json(state.service.get_removed_topology().await)
}

/// PATCH /reputation/{id}?reputation=N - Admin override
pub async fn set_reputation(
    State(state): State<MixminingApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    Query(query): Query<ReputationQuery>,
) -> Result<StatusCode, ApiError> {
    require_loopback(&addr, "/reputation")?;
    let identity = clean_identity(&id)?;
    state.service.set_reputation(&identity, query.reputation).await?;
    Ok(StatusCode::OK)
}

/// PATCH /reputation - Admin override for many nodes at once
pub async fn batch_set_reputation(
    State(state): State<MixminingApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(values): Json<HashMap<String, i64>>,
) -> Result<Json<BatchReputationResponse>, ApiError> {
    require_loopback(&addr, "/reputation")?;
    let values: HashMap<String, i64> = values
        .into_iter()
        .map(|(identity, value)| (sanitize_str(&identity), value))
        .filter(|(identity, _)| !identity.is_empty())
        .collect();
    let updated = state.service.batch_set_reputation(&values).await?;
    Ok(Json(BatchReputationResponse {
        requested: values.len(),
        updated,
    }))
}

/// Create the mixmining API router
pub fn create_router(state: MixminingApiState) -> Router {
    Router::new()
        .route("/", post(create_status))
        .route("/batch", post(batch_create_status))
        .route("/node/{pubkey}/history", get(list_history))
        .route("/node/{pubkey}/report", get(get_report))
        .route("/fullreport", get(full_report))
        .route("/register/mix", post(register_mix))
        .route("/register/gateway", post(register_gateway))
        .route("/register/{id}", delete(unregister))
        .route("/topology", get(topology))
        .route("/topology/active", get(active_topology))
        .route("/topology/removed", get(removed_topology))
        .route("/reputation", patch(batch_set_reputation))
        .route("/reputation/{id}", patch(set_reputation))
        .with_state(state)
}
