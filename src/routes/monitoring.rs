//! ML monitoring and governance API routes
//!
//! Detection applies any resulting guardrail transition; acknowledgment
//! and the human-gated status reset are separate synchronous calls.

use crate::audit::{ActorType, AuditEvent};
use crate::drift::{DriftSignal, ModelGovernanceState, ModelStatus};
use crate::error::ApiResult;
use crate::source::EntityKind;
use crate::state::SharedState;
use crate::tenant::TenantContext;
use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The decision-support model this deployment governs by default
const DEFAULT_MODEL_VERSION: &str = "decision-support-v1";

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    pub model_version: Option<String>,
    pub entity_kind: Option<EntityKind>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub success: bool,
    pub new_signals: Vec<DriftSignal>,
    pub state: ModelGovernanceState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    pub signal_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeResponse {
    pub success: bool,
    pub signal: DriftSignal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetStatusRequest {
    pub status: ModelStatus,
    pub model_version: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    pub success: bool,
    pub state: ModelGovernanceState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub state: ModelGovernanceState,
    pub unacknowledged_signals: Vec<DriftSignal>,
}

/// Run drift detection and apply any resulting state transition
pub async fn detect(
    State(state): State<SharedState>,
    Extension(ctx): Extension<TenantContext>,
    body: Option<Json<DetectRequest>>,
) -> ApiResult<Json<DetectResponse>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let model_version = req
        .model_version
        .unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string());
    let kind = req.entity_kind.unwrap_or(EntityKind::Sku);

    let _guard = state.locks.acquire(&ctx.tenant).await;
    let outcome = state.monitor.detect(&ctx.tenant, &model_version, kind).await?;

    Ok(Json(DetectResponse {
        success: true,
        new_signals: outcome.new_signals,
        state: outcome.state,
    }))
}

/// Mark a signal acknowledged; no status side effect
pub async fn acknowledge(
    State(state): State<SharedState>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<AcknowledgeRequest>,
) -> ApiResult<Json<AcknowledgeResponse>> {
    let signal = state.signals.acknowledge(&ctx.tenant, req.signal_id).await?;

    let event = AuditEvent::new(
        ActorType::User,
        ctx.actor_label(),
        "drift.signal_acknowledged",
        "drift_signal",
        signal.id.to_string(),
    )
    .with_reason(signal.signal_type.reason_code());
    state.audit.record(&ctx.tenant, event).await?;

    Ok(Json(AcknowledgeResponse {
        success: true,
        signal,
    }))
}

/// Human-gated de-escalation of model status
pub async fn reset_status(
    State(state): State<SharedState>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<ResetStatusRequest>,
) -> ApiResult<Json<StateResponse>> {
    let model_version = req
        .model_version
        .unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string());

    let _guard = state.locks.acquire(&ctx.tenant).await;
    let unacknowledged = state
        .signals
        .unacknowledged(&ctx.tenant, &model_version)
        .await;
    let new_state = state
        .governor
        .reset_status(
            &ctx.tenant,
            &model_version,
            req.status,
            &ctx.actor_label(),
            &unacknowledged,
        )
        .await?;

    Ok(Json(StateResponse {
        success: true,
        state: new_state,
    }))
}

/// Current governance state with outstanding signals (read-only)
pub async fn status(
    State(state): State<SharedState>,
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<Json<StatusResponse>> {
    let governance = state
        .governor
        .current(&ctx.tenant, DEFAULT_MODEL_VERSION)
        .await;
    let unacknowledged = state
        .signals
        .unacknowledged(&ctx.tenant, DEFAULT_MODEL_VERSION)
        .await;

    Ok(Json(StatusResponse {
        success: true,
        state: governance,
        unacknowledged_signals: unacknowledged,
    }))
}
