//! Learner dashboard

use axum::{extract::State, Extension, Json};
use ethica_common::analytics::LearnerDashboard;
use ethica_common::identity::Identity;
use serde::Serialize;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub dashboard: LearnerDashboard,
}

/// GET /api/dashboard/summary
pub async fn dashboard_summary(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<DashboardResponse>> {
    let dashboard = state.aggregator.learner_dashboard(&identity).await?;
    Ok(Json(DashboardResponse { dashboard }))
}
