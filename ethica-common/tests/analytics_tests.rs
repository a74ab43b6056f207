//! Analytics Aggregator rollups over seeded enrollments and statements

use ethica_common::analytics::AnalyticsAggregator;
use ethica_common::catalog::SqliteContentCatalog;
use ethica_common::config::DatabaseConfig;
use ethica_common::db::init_database;
use ethica_common::export::compliance_exports;
use ethica_common::identity::{Identity, Role, SqliteIdentityStore};
use ethica_common::models::ProgressStatus;
use ethica_common::tracker::{CourseActivity, ProgressTracker};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    identity: Arc<SqliteIdentityStore>,
    tracker: ProgressTracker,
    aggregator: AnalyticsAggregator,
}

async fn setup() -> Fixture {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("ethica.db"), &DatabaseConfig::default())
        .await
        .unwrap();

    let catalog = Arc::new(SqliteContentCatalog::new(pool.clone()));
    catalog.put_course("c-ethics", "Business Ethics").await.unwrap();
    catalog.put_course("c-privacy", "Data Privacy").await.unwrap();
    catalog.put_course("c-empty", "Anti-Bribery").await.unwrap();

    let identity = Arc::new(SqliteIdentityStore::open(pool.clone(), 12).await.unwrap());
    let tracker = ProgressTracker::new(pool.clone(), catalog.clone(), 1000);
    let aggregator = AnalyticsAggregator::new(pool, identity.clone(), catalog);

    Fixture {
        _dir: dir,
        identity,
        tracker,
        aggregator,
    }
}

async fn learner(fx: &Fixture, name: &str) -> Identity {
    let email = format!("{}@example.com", name.to_lowercase());
    fx.identity
        .register(name, &email, "correct-horse", Role::Learner)
        .await
        .unwrap()
}

async fn activity(fx: &Fixture, learner: &Identity, verb: &str, course: &str, score: Option<f64>) {
    let activity = CourseActivity {
        verb: verb.to_string(),
        course_id: course.to_string(),
        score,
        duration_seconds: Some(600.0),
        ..Default::default()
    };
    fx.tracker
        .record_course_activity(&learner.id, &activity)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_empty_database_summary() {
    let fx = setup().await;
    let summary = fx.aggregator.summary(None).await;

    assert_eq!(summary.total_learners, 0);
    assert_eq!(summary.average_completion, 0.0);
    assert_eq!(summary.average_score, 0.0);
    assert_eq!(summary.total_statements, 0);
    assert!(summary.leaderboard.is_empty());
    assert_eq!(summary.course_breakdown.len(), 3);
    assert!(summary.course_breakdown.iter().all(|c| c.enrollments == 0 && c.completion == 0.0));
}

#[tokio::test]
async fn test_average_score_excludes_nulls() {
    let fx = setup().await;
    let ada = learner(&fx, "Ada").await;
    let bob = learner(&fx, "Bob").await;

    activity(&fx, &ada, "completed", "c-ethics", Some(80.0)).await;
    activity(&fx, &bob, "experienced", "c-ethics", None).await;

    assert_eq!(fx.aggregator.average_score(None).await.unwrap(), 80.0);
    assert_eq!(fx.aggregator.average_completion(None).await.unwrap(), 75.0);
}

#[tokio::test]
async fn test_course_filter_scopes_rollups() {
    let fx = setup().await;
    let ada = learner(&fx, "Ada").await;

    activity(&fx, &ada, "completed", "c-ethics", Some(90.0)).await;
    activity(&fx, &ada, "viewed", "c-privacy", Some(40.0)).await;
    activity(&fx, &ada, "viewed", "c-privacy", None).await;

    assert_eq!(fx.aggregator.total_statements(None).await.unwrap(), 3);
    assert_eq!(fx.aggregator.total_statements(Some("c-privacy")).await.unwrap(), 2);
    assert_eq!(fx.aggregator.average_completion(Some("c-privacy")).await.unwrap(), 10.0);
    assert_eq!(fx.aggregator.average_score(Some("c-ethics")).await.unwrap(), 90.0);

    let breakdown = fx.aggregator.course_breakdown(Some("c-privacy")).await.unwrap();
    assert_eq!(breakdown.len(), 1);
    assert_eq!(breakdown[0].title.as_deref(), Some("Data Privacy"));
    assert_eq!(breakdown[0].average_score, Some(40.0));
    assert_eq!(breakdown[0].time_spent_minutes, 20.0);
}

#[tokio::test]
async fn test_leaderboard_orders_learners() {
    let fx = setup().await;
    let ada = learner(&fx, "Ada").await;
    let bob = learner(&fx, "Bob").await;
    let cy = learner(&fx, "Cy").await;
    fx.identity
        .register("Root", "root@example.com", "correct-horse", Role::Admin)
        .await
        .unwrap();

    activity(&fx, &ada, "experienced", "c-ethics", Some(70.0)).await;
    activity(&fx, &bob, "completed", "c-ethics", Some(95.0)).await;

    let board = fx.aggregator.leaderboard(None, 10).await.unwrap();
    let names: Vec<&str> = board.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Bob", "Ada", "Cy"]);
    assert_eq!(board[0].completion, Some(100.0));
    assert_eq!(board[2].user_id, cy.id);
    assert_eq!(board[2].completion, None);

    let limited = fx.aggregator.leaderboard(None, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].user_id, bob.id);
}

#[tokio::test]
async fn test_breakdown_includes_uncatalogued_courses() {
    let fx = setup().await;
    let ada = learner(&fx, "Ada").await;

    activity(&fx, &ada, "viewed", "c-legacy", None).await;

    let breakdown = fx.aggregator.course_breakdown(None).await.unwrap();
    let titles: Vec<Option<&str>> = breakdown.iter().map(|c| c.title.as_deref()).collect();
    assert_eq!(
        titles,
        vec![Some("Anti-Bribery"), Some("Business Ethics"), Some("Data Privacy"), None]
    );
    assert_eq!(breakdown[3].course_id, "c-legacy");
    assert_eq!(breakdown[3].average_score, None);
}

#[tokio::test]
async fn test_learner_dashboard() {
    let fx = setup().await;
    let ada = learner(&fx, "Ada").await;

    activity(&fx, &ada, "completed", "c-ethics", Some(85.0)).await;
    for _ in 0..25 {
        activity(&fx, &ada, "viewed", "c-privacy", None).await;
    }

    let dashboard = fx.aggregator.learner_dashboard(&ada).await.unwrap();
    assert_eq!(dashboard.learner_name, "Ada");
    assert_eq!(dashboard.items.len(), 2);
    assert_eq!(dashboard.recent_statements.len(), 20);

    let ethics = dashboard.items.iter().find(|i| i.course_id == "c-ethics").unwrap();
    assert_eq!(ethics.title.as_deref(), Some("Business Ethics"));
    assert_eq!(ethics.status, ProgressStatus::Completed);
    assert_eq!(ethics.time_spent_minutes, 10.0);
}

#[tokio::test]
async fn test_summary_exports_render() {
    let fx = setup().await;
    let ada = learner(&fx, "Ada").await;
    activity(&fx, &ada, "completed", "c-ethics", Some(80.0)).await;

    let summary = fx.aggregator.summary(None).await;
    assert_eq!(summary.total_learners, 1);
    assert_eq!(summary.total_statements, 1);

    let exports = compliance_exports(&summary).unwrap();
    assert!(exports.csv.starts_with("data:text/csv;base64,"));
    assert!(exports.pdf.starts_with("data:application/pdf;base64,"));
}
