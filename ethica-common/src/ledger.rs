//! Progress Ledger
//!
//! One current-state row per (learner, lesson). Every event overwrites the
//! derived fields of that row (last write wins, nulls included); the row id
//! and `created_at` are fixed by the first insert.
//!
//! Course-level enrollments use a different, monotonic rule; see
//! [`crate::enrollments::merge_activity`].

use crate::models::{ProgressRecord, ProgressStatus};
use crate::normalizer::NormalizedEvent;
use crate::time;
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqliteExecutor, SqlitePool};
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    SELECT id, learner_id, lesson_id, status, score, passed, completion,
           xapi_statement_id, last_event_at, updated_at, created_at
    FROM learner_progress
"#;

/// Insert or overwrite the current state of (learner, lesson)
pub async fn upsert_current_state(
    conn: &mut SqliteConnection,
    learner_id: &str,
    lesson_id: &str,
    event: &NormalizedEvent,
    now: DateTime<Utc>,
) -> Result<()> {
    let now = time::to_db(&now);

    sqlx::query(
        r#"
        INSERT INTO learner_progress (
            id, learner_id, lesson_id, status, score, passed, completion,
            xapi_statement_id, last_event_at, updated_at, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(learner_id, lesson_id) DO UPDATE SET
            status = excluded.status,
            score = excluded.score,
            passed = excluded.passed,
            completion = excluded.completion,
            xapi_statement_id = excluded.xapi_statement_id,
            last_event_at = excluded.last_event_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(learner_id)
    .bind(lesson_id)
    .bind(event.status.as_str())
    .bind(event.score.map(i64::from))
    .bind(event.passed)
    .bind(event.completion.map(i64::from))
    .bind(event.statement_id.as_deref())
    .bind(time::to_db(&event.event_at))
    .bind(&now)
    .bind(&now)
    .execute(conn)
    .await?;

    Ok(())
}

/// Fetch the row for (learner, lesson), without catalog context
pub async fn get<'e, E>(executor: E, learner_id: &str, lesson_id: &str) -> Result<Option<ProgressRecord>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("{} WHERE learner_id = ? AND lesson_id = ?", SELECT_COLUMNS);

    let row = sqlx::query(&sql)
        .bind(learner_id)
        .bind(lesson_id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// Rows for a learner, optionally narrowed to one lesson, most recently updated first
pub async fn list_by_learner(
    pool: &SqlitePool,
    learner_id: &str,
    lesson_id: Option<&str>,
) -> Result<Vec<ProgressRecord>> {
    let rows = match lesson_id {
        Some(lesson_id) => {
            let sql = format!(
                "{} WHERE learner_id = ? AND lesson_id = ? ORDER BY updated_at DESC, id",
                SELECT_COLUMNS
            );
            sqlx::query(&sql)
                .bind(learner_id)
                .bind(lesson_id)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!("{} WHERE learner_id = ? ORDER BY updated_at DESC, id", SELECT_COLUMNS);
            sqlx::query(&sql).bind(learner_id).fetch_all(pool).await?
        }
    };

    rows.iter().map(record_from_row).collect()
}

/// Number of rows for a (learner, lesson) pair (0 or 1 while the unique key holds)
pub async fn count_for(pool: &SqlitePool, learner_id: &str, lesson_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM learner_progress WHERE learner_id = ? AND lesson_id = ?",
    )
    .bind(learner_id)
    .bind(lesson_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

pub async fn delete_by_learner(conn: &mut SqliteConnection, learner_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM learner_progress WHERE learner_id = ?")
        .bind(learner_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Delete every row whose lesson is in `lesson_ids`
pub async fn delete_by_lessons(conn: &mut SqliteConnection, lesson_ids: &[String]) -> Result<u64> {
    let mut removed = 0;

    for lesson_id in lesson_ids {
        let result = sqlx::query("DELETE FROM learner_progress WHERE lesson_id = ?")
            .bind(lesson_id)
            .execute(&mut *conn)
            .await?;
        removed += result.rows_affected();
    }

    Ok(removed)
}

fn record_from_row(row: &SqliteRow) -> Result<ProgressRecord> {
    let status: String = row.try_get("status")?;
    let score: Option<i64> = row.try_get("score")?;
    let completion: Option<i64> = row.try_get("completion")?;
    let last_event_at: String = row.try_get("last_event_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(ProgressRecord {
        id: row.try_get("id")?,
        learner_id: row.try_get("learner_id")?,
        lesson_id: row.try_get("lesson_id")?,
        status: status.parse::<ProgressStatus>()?,
        score: score.map(clamp_percent),
        passed: row.try_get("passed")?,
        completion: completion.map(clamp_percent),
        xapi_statement_id: row.try_get("xapi_statement_id")?,
        last_event_at: time::from_db(&last_event_at)?,
        updated_at: time::from_db(&updated_at)?,
        created_at: time::from_db(&created_at)?,
        lesson: None,
    })
}

fn clamp_percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}
