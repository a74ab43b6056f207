//! Course-level learning-record statements

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use ethica_common::identity::Identity;
use ethica_common::tracker::{ActivityReceipt, CourseActivity};

use crate::error::ApiResult;
use crate::AppState;

/// POST /api/xapi/statements
///
/// Appends the statement for the authenticated learner and merges the
/// course enrollment.
pub async fn record_statement(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<CourseActivity>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ActivityReceipt>)> {
    let Json(activity) = payload?;
    let receipt = state
        .tracker
        .record_course_activity(&identity.id, &activity)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
