//! Consistency report API routes

use crate::consistency::ConsistencyReport;
use crate::error::ApiResult;
use crate::state::SharedState;
use crate::tenant::TenantContext;
use axum::{
    extract::{Extension, State},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub success: bool,
    pub report: ConsistencyReport,
}

/// Latest consistency report; runs fresh checks when the cached report
/// has aged past the staleness window
pub async fn get_report(
    State(state): State<SharedState>,
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<Json<ReportResponse>> {
    // Serialize runs per tenant; parallel tenants proceed independently
    let _guard = state.locks.acquire(&ctx.tenant).await;
    let report = state.consistency.report(&ctx.tenant).await?;

    Ok(Json(ReportResponse {
        success: true,
        report,
    }))
}
