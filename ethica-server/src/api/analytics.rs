//! Admin analytics with compliance exports

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use ethica_common::analytics::AnalyticsSummary;
use ethica_common::export::{compliance_exports, ComplianceExports};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsParams {
    pub course_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsPayload {
    #[serde(flatten)]
    pub summary: AnalyticsSummary,
    pub compliance_exports: ComplianceExports,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub analytics: AnalyticsPayload,
}

/// GET /api/admin/analytics?courseId=...
///
/// Rollups that fail are reported as their zero or empty defaults; only a
/// malformed query string (400) or a failed PDF render (500) is an error.
pub async fn admin_analytics(
    State(state): State<AppState>,
    params: Result<Query<AnalyticsParams>, QueryRejection>,
) -> ApiResult<Json<AnalyticsResponse>> {
    let Query(params) = params?;
    let course_id = params
        .course_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    let summary = state.aggregator.summary(course_id).await;
    let compliance_exports = compliance_exports(&summary)?;
    debug!(course_id = ?course_id, learners = summary.total_learners, "Built analytics summary");

    Ok(Json(AnalyticsResponse {
        analytics: AnalyticsPayload {
            summary,
            compliance_exports,
        },
    }))
}
