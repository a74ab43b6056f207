//! Database initialization
//!
//! Creates the database file and every table on first run. Safe to call on
//! an existing database: all statements are `IF NOT EXISTS`.

use crate::config::DatabaseConfig;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// SQLite busy timeout applied to every pooled connection
const BUSY_TIMEOUT_MS: u64 = 250;

/// Open (creating if needed) the database and bring the schema up to date
pub async fn init_database(db_path: &Path, config: &DatabaseConfig) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them.
    // WAL lets analytics reads proceed alongside the single writer.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema_version_table(&pool).await?;
    create_settings_table(&pool).await?;
    create_users_table(&pool).await?;
    create_catalog_tables(&pool).await?;
    create_learner_progress_table(&pool).await?;
    create_statement_log_table(&pool).await?;
    create_enrollments_table(&pool).await?;

    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Key-value settings (holds the token signing secret)
async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Identity store backing [`crate::identity::SqliteIdentityStore`]
async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'learner' CHECK (role IN ('admin', 'learner')),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Read-only content catalog. Populated by course authoring, never by this core.
async fn create_catalog_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lessons (
            id TEXT PRIMARY KEY,
            course_id TEXT,
            title TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Progress Ledger: one row per (learner, lesson)
async fn create_learner_progress_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS learner_progress (
            id TEXT PRIMARY KEY,
            learner_id TEXT NOT NULL,
            lesson_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'not-started'
                CHECK (status IN ('not-started', 'in-progress', 'completed')),
            score INTEGER CHECK (score IS NULL OR score BETWEEN 0 AND 100),
            passed INTEGER,
            completion INTEGER CHECK (completion IS NULL OR completion BETWEEN 0 AND 100),
            xapi_statement_id TEXT,
            last_event_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (learner_id, lesson_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Statement Log: keyed by the caller's statement id
async fn create_statement_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS statement_log (
            statement_id TEXT PRIMARY KEY,
            learner_id TEXT NOT NULL,
            object_id TEXT,
            verb TEXT,
            course_id TEXT,
            module_id TEXT,
            score REAL,
            duration_seconds INTEGER,
            raw_event TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Enrollment summaries: one row per (learner, course)
async fn create_enrollments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enrollments (
            id TEXT PRIMARY KEY,
            learner_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'not-started'
                CHECK (status IN ('not-started', 'in-progress', 'completed')),
            progress REAL NOT NULL DEFAULT 0,
            score REAL,
            time_spent_seconds INTEGER NOT NULL DEFAULT 0,
            last_activity_at TEXT,
            UNIQUE (learner_id, course_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
