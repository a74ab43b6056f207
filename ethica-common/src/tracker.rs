//! Progress Tracker
//!
//! Write-side orchestrator: validates an inbound event, normalizes it and
//! applies the ledger and statement-log upserts in one transaction. Also owns
//! the course-level activity path that feeds enrollment summaries, and the
//! administrative purge.

use crate::catalog::ContentCatalog;
use crate::db::retry_on_lock;
use crate::enrollments::{self, ActivityContribution};
use crate::ledger;
use crate::models::{LessonContext, ProgressRecord, StatementLogEntry};
use crate::normalizer::{normalize, ProgressEvent, Verb};
use crate::statements;
use crate::time;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Longest single course activity folded into time spent (one day)
pub const MAX_ACTIVITY_SECONDS: i64 = 86_400;

/// Merged view returned by [`ProgressTracker::record`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub progress: ProgressRecord,
    pub statement: Option<StatementLogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    pub progress: Vec<ProgressRecord>,
    pub statements: Vec<StatementLogEntry>,
}

/// Course-level activity posted by an authenticated learner
///
/// Unrecognized fields are kept and stored with the raw event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseActivity {
    #[serde(default)]
    pub verb: String,
    #[serde(default)]
    pub course_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityReceipt {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Rows removed by a purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeCounts {
    pub progress_removed: u64,
    pub statements_removed: u64,
    pub enrollments_removed: u64,
}

pub struct ProgressTracker {
    pool: SqlitePool,
    catalog: Arc<dyn ContentCatalog>,
    max_lock_wait_ms: u64,
}

impl ProgressTracker {
    pub fn new(pool: SqlitePool, catalog: Arc<dyn ContentCatalog>, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            catalog,
            max_lock_wait_ms,
        }
    }

    /// Record one progress event and return the merged state
    ///
    /// Nothing is written when either identifier is missing or the explicit
    /// status is unknown. Replaying a statement id rewrites the same rows.
    pub async fn record(&self, event: &ProgressEvent) -> Result<RecordOutcome> {
        let learner_id = required(event.learner_id.as_deref(), "learnerId")?;
        let lesson_id = required(event.lesson_id.as_deref(), "lessonId")?;

        let now = time::now();
        let normalized = normalize(event, now)?;
        let lesson = self.lesson_context(lesson_id).await;

        let entry = normalized.statement_id.as_ref().map(|statement_id| StatementLogEntry {
            statement_id: statement_id.clone(),
            learner_id: learner_id.to_string(),
            object_id: normalized
                .object_id
                .clone()
                .or_else(|| Some(lesson_id.to_string())),
            verb: normalized.verb.clone(),
            course_id: lesson.as_ref().and_then(|l| l.course_id.clone()),
            module_id: None,
            score: normalized.score.map(f64::from),
            duration_seconds: None,
            raw_event: normalized.raw_event.clone().unwrap_or(Value::Null),
            recorded_at: normalized.event_at,
            created_at: now,
        });

        retry_on_lock("record_progress", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;
            ledger::upsert_current_state(&mut tx, learner_id, lesson_id, &normalized, now).await?;
            if let Some(entry) = &entry {
                statements::upsert(&mut tx, entry).await?;
            }
            tx.commit().await?;
            Ok::<_, Error>(())
        })
        .await?;

        debug!(
            learner_id,
            lesson_id,
            status = %normalized.status,
            statement_id = ?normalized.statement_id,
            "Recorded progress"
        );

        let mut progress = ledger::get(&self.pool, learner_id, lesson_id)
            .await?
            .ok_or_else(|| Error::Internal("Progress row missing after commit".to_string()))?;
        progress.lesson = lesson;

        let statement = match &normalized.statement_id {
            Some(statement_id) => statements::get(&self.pool, statement_id).await?,
            None => None,
        };

        Ok(RecordOutcome { progress, statement })
    }

    /// Ledger rows and log entries for a learner, newest first
    pub async fn query(&self, learner_id: &str, lesson_id: Option<&str>) -> Result<ProgressQuery> {
        let learner_id = required(Some(learner_id), "learnerId")?;
        let lesson_id = lesson_id.map(str::trim).filter(|id| !id.is_empty());

        let mut progress = ledger::list_by_learner(&self.pool, learner_id, lesson_id).await?;

        let mut contexts: HashMap<String, Option<LessonContext>> = HashMap::new();
        for record in &mut progress {
            if !contexts.contains_key(&record.lesson_id) {
                let context = self.lesson_context(&record.lesson_id).await;
                contexts.insert(record.lesson_id.clone(), context);
            }
            record.lesson = contexts.get(&record.lesson_id).cloned().flatten();
        }

        let statements = statements::list_by_learner(&self.pool, learner_id, lesson_id).await?;

        Ok(ProgressQuery { progress, statements })
    }

    /// Append a course-level statement and fold it into the enrollment
    pub async fn record_course_activity(
        &self,
        learner_id: &str,
        activity: &CourseActivity,
    ) -> Result<ActivityReceipt> {
        let learner_id = required(Some(learner_id), "learnerId")?;
        let verb_text = required(Some(&activity.verb), "verb")?;
        let course_id = required(Some(&activity.course_id), "courseId")?;
        let module_id = activity
            .module_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let now = time::now();
        let verb = Verb::parse(verb_text);
        let duration_seconds = activity
            .duration_seconds
            .filter(|d| d.is_finite())
            .map(|d| d.round().clamp(0.0, MAX_ACTIVITY_SECONDS as f64) as i64);
        let score = activity
            .score
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(0.0, 100.0));

        let entry = StatementLogEntry {
            statement_id: Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            object_id: Some(module_id.unwrap_or(course_id).to_string()),
            verb: Some(verb_text.to_string()),
            course_id: Some(course_id.to_string()),
            module_id: module_id.map(str::to_string),
            score,
            duration_seconds,
            raw_event: serde_json::to_value(activity)?,
            recorded_at: now,
            created_at: now,
        };
        let contribution = ActivityContribution {
            verb,
            score,
            duration_seconds: duration_seconds.unwrap_or(0),
            at: now,
        };

        retry_on_lock("record_course_activity", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;
            statements::upsert(&mut tx, &entry).await?;
            enrollments::merge_activity(&mut tx, learner_id, course_id, &contribution).await?;
            tx.commit().await?;
            Ok::<_, Error>(())
        })
        .await?;

        debug!(
            learner_id,
            course_id,
            verb = contribution.verb.name(),
            statement_id = %entry.statement_id,
            "Recorded course activity"
        );

        Ok(ActivityReceipt {
            id: entry.statement_id,
            created_at: entry.created_at,
        })
    }

    /// Remove every ledger row, log entry and enrollment of a learner
    pub async fn purge_learner(&self, learner_id: &str) -> Result<PurgeCounts> {
        let learner_id = required(Some(learner_id), "learnerId")?;

        let counts = retry_on_lock("purge_learner", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;
            let counts = PurgeCounts {
                progress_removed: ledger::delete_by_learner(&mut tx, learner_id).await?,
                statements_removed: statements::delete_by_learner(&mut tx, learner_id).await?,
                enrollments_removed: enrollments::delete_by_learner(&mut tx, learner_id).await?,
            };
            tx.commit().await?;
            Ok::<_, Error>(counts)
        })
        .await?;

        info!(
            learner_id,
            progress = counts.progress_removed,
            statements = counts.statements_removed,
            enrollments = counts.enrollments_removed,
            "Purged learner records"
        );
        Ok(counts)
    }

    /// Remove the records of a course
    ///
    /// Ledger rows are matched through the catalog's lesson list; log entries
    /// by course id or by object id (the course or one of its lessons).
    pub async fn purge_course(&self, course_id: &str) -> Result<PurgeCounts> {
        let course_id = required(Some(course_id), "courseId")?;
        let lesson_ids = self.catalog.course_lesson_ids(course_id).await?;

        let counts = retry_on_lock("purge_course", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;
            let counts = PurgeCounts {
                progress_removed: ledger::delete_by_lessons(&mut tx, &lesson_ids).await?,
                statements_removed: statements::delete_by_course(&mut tx, course_id, &lesson_ids)
                    .await?,
                enrollments_removed: enrollments::delete_by_course(&mut tx, course_id).await?,
            };
            tx.commit().await?;
            Ok::<_, Error>(counts)
        })
        .await?;

        info!(
            course_id,
            lessons = lesson_ids.len(),
            progress = counts.progress_removed,
            statements = counts.statements_removed,
            enrollments = counts.enrollments_removed,
            "Purged course records"
        );
        Ok(counts)
    }

    /// Catalog lookup that never fails the write path
    async fn lesson_context(&self, lesson_id: &str) -> Option<LessonContext> {
        match self.catalog.lesson(lesson_id).await {
            Ok(Some(context)) => Some(context),
            Ok(None) => {
                debug!(lesson_id, "Lesson not in catalog, recording without context");
                None
            }
            Err(e) => {
                warn!(lesson_id, error = %e, "Catalog lookup failed, recording without context");
                None
            }
        }
    }
}

/// Trimmed, non-empty identifier or a validation error naming the field
fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Validation(format!("{} is required", field)))
}
