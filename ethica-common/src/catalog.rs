//! Content catalog collaborator
//!
//! Courses and lessons are authored elsewhere; the tracker only reads titles
//! and course membership to decorate records and scope analytics. A lesson
//! missing from the catalog is never an error.

use crate::models::LessonContext;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRef {
    pub id: String,
    pub title: String,
}

#[async_trait]
pub trait ContentCatalog: Send + Sync {
    async fn lesson(&self, lesson_id: &str) -> Result<Option<LessonContext>>;

    /// All courses ordered by title, then id
    async fn courses(&self) -> Result<Vec<CourseRef>>;

    async fn course_lesson_ids(&self, course_id: &str) -> Result<Vec<String>>;
}

/// Catalog backed by the `courses` and `lessons` tables
#[derive(Clone)]
pub struct SqliteContentCatalog {
    pool: SqlitePool,
}

impl SqliteContentCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or rename a course (seeding and tests)
    pub async fn put_course(&self, id: &str, title: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO courses (id, title) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET title = excluded.title",
        )
        .bind(id)
        .bind(title)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or move a lesson (seeding and tests)
    pub async fn put_lesson(&self, id: &str, course_id: Option<&str>, title: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO lessons (id, course_id, title) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET course_id = excluded.course_id, title = excluded.title",
        )
        .bind(id)
        .bind(course_id)
        .bind(title)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ContentCatalog for SqliteContentCatalog {
    async fn lesson(&self, lesson_id: &str) -> Result<Option<LessonContext>> {
        let row = sqlx::query(
            r#"
            SELECT l.id, l.title, l.course_id, c.title AS course_title
            FROM lessons l
            LEFT JOIN courses c ON c.id = l.course_id
            WHERE l.id = ?
            "#,
        )
        .bind(lesson_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| LessonContext {
            id: row.get("id"),
            title: row.get("title"),
            course_id: row.get("course_id"),
            course_title: row.get("course_title"),
        }))
    }

    async fn courses(&self) -> Result<Vec<CourseRef>> {
        let rows = sqlx::query("SELECT id, title FROM courses ORDER BY title, id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| CourseRef {
                id: row.get("id"),
                title: row.get("title"),
            })
            .collect())
    }

    async fn course_lesson_ids(&self, course_id: &str) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM lessons WHERE course_id = ? ORDER BY id")
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }
}
