//! Enrollment summaries
//!
//! One rollup row per (learner, course), fed by course-level activity.
//! Unlike the Progress Ledger, progress here only grows. Time accumulates
//! (saturating at `i64::MAX`), a missing score keeps the previous one, and the
//! status follows the latest verb.

use crate::models::{EnrollmentSummary, ProgressStatus};
use crate::normalizer::Verb;
use crate::time;
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqliteExecutor, SqlitePool};
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    SELECT id, learner_id, course_id, status, progress, score,
           time_spent_seconds, last_activity_at
    FROM enrollments
"#;

/// One course-level activity as seen by the merge
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityContribution {
    pub verb: Verb,
    pub score: Option<f64>,
    pub duration_seconds: i64,
    pub at: DateTime<Utc>,
}

/// Fold one activity into the (learner, course) enrollment
///
/// `progress = min(100, max(existing, weight))`, `score = incoming ?? existing`,
/// time adds up and status is `completed` only for a completed verb.
pub async fn merge_activity(
    conn: &mut SqliteConnection,
    learner_id: &str,
    course_id: &str,
    activity: &ActivityContribution,
) -> Result<()> {
    let weight = activity.verb.course_weight().clamp(0.0, 100.0);
    let status = if activity.verb == Verb::Completed {
        ProgressStatus::Completed
    } else {
        ProgressStatus::InProgress
    };

    sqlx::query(
        r#"
        INSERT INTO enrollments (
            id, learner_id, course_id, status, progress, score,
            time_spent_seconds, last_activity_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(learner_id, course_id) DO UPDATE SET
            progress = MIN(100, MAX(enrollments.progress, excluded.progress)),
            score = COALESCE(excluded.score, enrollments.score),
            time_spent_seconds = MIN(
                9223372036854775807 - excluded.time_spent_seconds,
                enrollments.time_spent_seconds
            ) + excluded.time_spent_seconds,
            status = excluded.status,
            last_activity_at = excluded.last_activity_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(learner_id)
    .bind(course_id)
    .bind(status.as_str())
    .bind(weight)
    .bind(activity.score)
    .bind(activity.duration_seconds.max(0))
    .bind(time::to_db(&activity.at))
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn get<'e, E>(executor: E, learner_id: &str, course_id: &str) -> Result<Option<EnrollmentSummary>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("{} WHERE learner_id = ? AND course_id = ?", SELECT_COLUMNS);

    let row = sqlx::query(&sql)
        .bind(learner_id)
        .bind(course_id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(summary_from_row).transpose()
}

/// All enrollments of a learner, most recent activity first
pub async fn list_for_learner(pool: &SqlitePool, learner_id: &str) -> Result<Vec<EnrollmentSummary>> {
    let sql = format!(
        "{} WHERE learner_id = ? ORDER BY last_activity_at DESC, course_id",
        SELECT_COLUMNS
    );

    let rows = sqlx::query(&sql).bind(learner_id).fetch_all(pool).await?;

    rows.iter().map(summary_from_row).collect()
}

pub async fn delete_by_learner(conn: &mut SqliteConnection, learner_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM enrollments WHERE learner_id = ?")
        .bind(learner_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

pub async fn delete_by_course(conn: &mut SqliteConnection, course_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM enrollments WHERE course_id = ?")
        .bind(course_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

fn summary_from_row(row: &SqliteRow) -> Result<EnrollmentSummary> {
    let status: String = row.try_get("status")?;
    let last_activity_at: Option<String> = row.try_get("last_activity_at")?;

    Ok(EnrollmentSummary {
        id: row.try_get("id")?,
        learner_id: row.try_get("learner_id")?,
        course_id: row.try_get("course_id")?,
        status: status.parse()?,
        progress: row.try_get("progress")?,
        score: row.try_get("score")?,
        time_spent_seconds: row.try_get("time_spent_seconds")?,
        last_activity_at: last_activity_at.as_deref().map(time::from_db).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.db"), &DatabaseConfig::default())
            .await
            .unwrap();
        (dir, pool)
    }

    fn activity(verb: Verb, score: Option<f64>, duration_seconds: i64) -> ActivityContribution {
        ActivityContribution {
            verb,
            score,
            duration_seconds,
            at: time::now(),
        }
    }

    async fn merge(pool: &SqlitePool, contribution: ActivityContribution) -> EnrollmentSummary {
        let mut conn = pool.acquire().await.unwrap();
        merge_activity(&mut conn, "learner-1", "course-1", &contribution)
            .await
            .unwrap();
        get(pool, "learner-1", "course-1").await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_experienced_does_not_lower_progress() {
        let (_dir, pool) = setup().await;

        let first = merge(&pool, activity(Verb::Experienced, None, 0)).await;
        assert_eq!(first.progress, 50.0);

        let second = merge(&pool, activity(Verb::Experienced, None, 0)).await;
        assert_eq!(second.progress, 50.0);

        let third = merge(&pool, activity(Verb::Viewed, None, 0)).await;
        assert_eq!(third.progress, 50.0);
    }

    #[tokio::test]
    async fn test_completed_raises_to_full_status_follows_verb() {
        let (_dir, pool) = setup().await;

        merge(&pool, activity(Verb::Experienced, None, 0)).await;
        let done = merge(&pool, activity(Verb::Completed, None, 0)).await;
        assert_eq!(done.progress, 100.0);
        assert_eq!(done.status, ProgressStatus::Completed);

        let after = merge(&pool, activity(Verb::Answered, None, 0)).await;
        assert_eq!(after.progress, 100.0);
        assert_eq!(after.status, ProgressStatus::InProgress);
    }

    #[tokio::test]
    async fn test_time_spent_saturates() {
        let (_dir, pool) = setup().await;

        merge(&pool, activity(Verb::Experienced, None, i64::MAX)).await;
        let merged = merge(&pool, activity(Verb::Experienced, None, i64::MAX)).await;
        assert_eq!(merged.time_spent_seconds, i64::MAX);

        let listed = list_for_learner(&pool, "learner-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].time_spent_seconds, i64::MAX);
    }

    #[tokio::test]
    async fn test_score_kept_when_absent_and_time_accumulates() {
        let (_dir, pool) = setup().await;

        merge(&pool, activity(Verb::Answered, Some(70.0), 120)).await;
        let merged = merge(&pool, activity(Verb::Answered, None, 60)).await;
        assert_eq!(merged.score, Some(70.0));
        assert_eq!(merged.time_spent_seconds, 180);

        let rescored = merge(&pool, activity(Verb::Passed, Some(90.0), -30)).await;
        assert_eq!(rescored.score, Some(90.0));
        assert_eq!(rescored.time_spent_seconds, 180);
        assert_eq!(rescored.status, ProgressStatus::InProgress);
    }
}
