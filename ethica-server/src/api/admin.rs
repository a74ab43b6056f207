//! Administrative purge of learner or course records

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use ethica_common::identity::Identity;
use ethica_common::tracker::PurgeCounts;
use serde::Serialize;
use tracing::info;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerPurgeResponse {
    pub learner_id: String,
    #[serde(flatten)]
    pub counts: PurgeCounts,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePurgeResponse {
    pub course_id: String,
    #[serde(flatten)]
    pub counts: PurgeCounts,
}

/// DELETE /api/admin/learners/:learner_id/records
pub async fn purge_learner(
    State(state): State<AppState>,
    Extension(admin): Extension<Identity>,
    Path(learner_id): Path<String>,
) -> ApiResult<Json<LearnerPurgeResponse>> {
    let counts = state.tracker.purge_learner(&learner_id).await?;
    info!(admin_id = %admin.id, learner_id = %learner_id, "Learner records purged");
    Ok(Json(LearnerPurgeResponse { learner_id, counts }))
}

/// DELETE /api/admin/courses/:course_id/records
pub async fn purge_course(
    State(state): State<AppState>,
    Extension(admin): Extension<Identity>,
    Path(course_id): Path<String>,
) -> ApiResult<Json<CoursePurgeResponse>> {
    let counts = state.tracker.purge_course(&course_id).await?;
    info!(admin_id = %admin.id, course_id = %course_id, "Course records purged");
    Ok(Json(CoursePurgeResponse { course_id, counts }))
}
