//! Statement Log
//!
//! Append-only record of every learning-record statement, keyed by the
//! statement id. A replayed statement overwrites its own row in place, so the
//! log never holds two entries for one id.

use crate::models::StatementLogEntry;
use crate::time;
use crate::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqliteExecutor, SqlitePool};

const SELECT_COLUMNS: &str = r#"
    SELECT statement_id, learner_id, object_id, verb, course_id, module_id,
           score, duration_seconds, raw_event, recorded_at, created_at
    FROM statement_log
"#;

/// Insert a statement, or overwrite everything but `created_at` on replay
pub async fn upsert(conn: &mut SqliteConnection, entry: &StatementLogEntry) -> Result<()> {
    let raw_event = serde_json::to_string(&entry.raw_event)?;

    sqlx::query(
        r#"
        INSERT INTO statement_log (
            statement_id, learner_id, object_id, verb, course_id, module_id,
            score, duration_seconds, raw_event, recorded_at, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(statement_id) DO UPDATE SET
            learner_id = excluded.learner_id,
            object_id = excluded.object_id,
            verb = excluded.verb,
            course_id = excluded.course_id,
            module_id = excluded.module_id,
            score = excluded.score,
            duration_seconds = excluded.duration_seconds,
            raw_event = excluded.raw_event,
            recorded_at = excluded.recorded_at
        "#,
    )
    .bind(&entry.statement_id)
    .bind(&entry.learner_id)
    .bind(entry.object_id.as_deref())
    .bind(entry.verb.as_deref())
    .bind(entry.course_id.as_deref())
    .bind(entry.module_id.as_deref())
    .bind(entry.score)
    .bind(entry.duration_seconds)
    .bind(&raw_event)
    .bind(time::to_db(&entry.recorded_at))
    .bind(time::to_db(&entry.created_at))
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn get<'e, E>(executor: E, statement_id: &str) -> Result<Option<StatementLogEntry>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("{} WHERE statement_id = ?", SELECT_COLUMNS);

    let row = sqlx::query(&sql)
        .bind(statement_id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Entries for a learner, newest first; `object_id` narrows to one unit
pub async fn list_by_learner(
    pool: &SqlitePool,
    learner_id: &str,
    object_id: Option<&str>,
) -> Result<Vec<StatementLogEntry>> {
    let rows = match object_id {
        Some(object_id) => {
            let sql = format!(
                "{} WHERE learner_id = ? AND object_id = ? ORDER BY recorded_at DESC, statement_id",
                SELECT_COLUMNS
            );
            sqlx::query(&sql)
                .bind(learner_id)
                .bind(object_id)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!(
                "{} WHERE learner_id = ? ORDER BY recorded_at DESC, statement_id",
                SELECT_COLUMNS
            );
            sqlx::query(&sql).bind(learner_id).fetch_all(pool).await?
        }
    };

    rows.iter().map(entry_from_row).collect()
}

/// Newest `limit` entries for a learner
pub async fn recent_for_learner(
    pool: &SqlitePool,
    learner_id: &str,
    limit: u32,
) -> Result<Vec<StatementLogEntry>> {
    let sql = format!(
        "{} WHERE learner_id = ? ORDER BY recorded_at DESC, statement_id LIMIT ?",
        SELECT_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(learner_id)
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await?;

    rows.iter().map(entry_from_row).collect()
}

/// Number of entries, optionally for one course
pub async fn count(pool: &SqlitePool, course_id: Option<&str>) -> Result<i64> {
    let count: i64 = match course_id {
        Some(course_id) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM statement_log WHERE course_id = ?")
                .bind(course_id)
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM statement_log")
                .fetch_one(pool)
                .await?
        }
    };

    Ok(count)
}

pub async fn delete_by_learner(conn: &mut SqliteConnection, learner_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM statement_log WHERE learner_id = ?")
        .bind(learner_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Delete entries tagged with the course, or whose object is the course or one of its lessons
pub async fn delete_by_course(
    conn: &mut SqliteConnection,
    course_id: &str,
    lesson_ids: &[String],
) -> Result<u64> {
    let mut removed = sqlx::query("DELETE FROM statement_log WHERE course_id = ? OR object_id = ?")
        .bind(course_id)
        .bind(course_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    for lesson_id in lesson_ids {
        removed += sqlx::query("DELETE FROM statement_log WHERE object_id = ?")
            .bind(lesson_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }

    Ok(removed)
}

fn entry_from_row(row: &SqliteRow) -> Result<StatementLogEntry> {
    let raw_event: String = row.try_get("raw_event")?;
    let recorded_at: String = row.try_get("recorded_at")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(StatementLogEntry {
        statement_id: row.try_get("statement_id")?,
        learner_id: row.try_get("learner_id")?,
        object_id: row.try_get("object_id")?,
        verb: row.try_get("verb")?,
        course_id: row.try_get("course_id")?,
        module_id: row.try_get("module_id")?,
        score: row.try_get("score")?,
        duration_seconds: row.try_get("duration_seconds")?,
        raw_event: serde_json::from_str(&raw_event)?,
        recorded_at: time::from_db(&recorded_at)?,
        created_at: time::from_db(&created_at)?,
    })
}
