//! Audit trail and evidence API routes

use crate::audit::{export, AuditEvent, AuditQuery, EvidencePack, EvidenceWindow};
use crate::error::{ApiResult, AppError};
use crate::state::SharedState;
use crate::tenant::TenantContext;
use axum::{
    extract::{Extension, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub success: bool,
    pub events: Vec<AuditEvent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePackResponse {
    pub success: bool,
    pub pack: EvidencePack,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

/// Paginated audit events with filters
pub async fn list_events(
    State(state): State<SharedState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<EventsResponse>> {
    let events = state.audit.query(&ctx.tenant, &query).await;
    Ok(Json(EventsResponse {
        success: true,
        events,
    }))
}

/// Evidence pack for a trailing window (7d, 30d or 90d)
pub async fn evidence_pack(
    State(state): State<SharedState>,
    Extension(ctx): Extension<TenantContext>,
    Path(window): Path<String>,
) -> ApiResult<Json<EvidencePackResponse>> {
    let window = EvidenceWindow::parse(&window)?;
    let pack = state.evidence.build(&ctx.tenant, window).await?;
    Ok(Json(EvidencePackResponse {
        success: true,
        pack,
    }))
}

/// Full audit export as JSON or CSV
pub async fn export(
    State(state): State<SharedState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let events = state.audit.all(&ctx.tenant).await;

    match query.format.as_deref().unwrap_or("json") {
        "json" => {
            let body = export::export_json(&events)?;
            Ok((
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response())
        }
        "csv" => {
            let body = export::export_csv(&events)?;
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"audit-export.csv\"",
                    ),
                ],
                body,
            )
                .into_response())
        }
        other => Err(AppError::BadRequest(format!(
            "unsupported export format '{}', expected json or csv",
            other
        ))),
    }
}
