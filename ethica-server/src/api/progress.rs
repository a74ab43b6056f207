//! Progress endpoints
//!
//! No bearer token here: the caller names the learner explicitly in the
//! event or query.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    Json,
};
use ethica_common::normalizer::ProgressEvent;
use ethica_common::tracker::{ProgressQuery, RecordOutcome};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    pub learner_id: Option<String>,
    pub lesson_id: Option<String>,
}

/// POST /api/progress
///
/// 201 with the merged record and the stored statement (or null).
pub async fn record_progress(
    State(state): State<AppState>,
    payload: Result<Json<ProgressEvent>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RecordOutcome>)> {
    let Json(event) = payload?;
    let outcome = state.tracker.record(&event).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/progress?learnerId=...&lessonId=...
pub async fn query_progress(
    State(state): State<AppState>,
    params: Result<Query<ProgressParams>, QueryRejection>,
) -> ApiResult<Json<ProgressQuery>> {
    let Query(params) = params?;
    let learner_id = params.learner_id.unwrap_or_default();
    let result = state
        .tracker
        .query(&learner_id, params.lesson_id.as_deref())
        .await?;
    Ok(Json(result))
}
