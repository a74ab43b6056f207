//! Analytics Aggregator
//!
//! Read-side rollups over enrollments and the statement log. Reads are not
//! isolated from concurrent writes; a summary is a best-effort snapshot.

use crate::catalog::ContentCatalog;
use crate::enrollments;
use crate::identity::{Identity, IdentityProvider};
use crate::models::ProgressStatus;
use crate::statements;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
pub const DASHBOARD_STATEMENT_LIMIT: u32 = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_learners: i64,
    pub average_completion: f64,
    pub average_score: f64,
    pub total_statements: i64,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub course_breakdown: Vec<CourseBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub name: String,
    /// Mean enrollment progress; `None` for a learner with no enrollment
    pub completion: Option<f64>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseBreakdown {
    pub course_id: String,
    /// `None` when the course is not in the catalog
    pub title: Option<String>,
    pub completion: f64,
    pub average_score: Option<f64>,
    pub time_spent_minutes: f64,
    pub enrollments: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerDashboard {
    pub learner_name: String,
    pub items: Vec<DashboardItem>,
    pub recent_statements: Vec<RecentStatement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardItem {
    pub course_id: String,
    pub title: Option<String>,
    pub progress: f64,
    pub score: Option<f64>,
    pub status: ProgressStatus,
    pub time_spent_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentStatement {
    pub id: String,
    pub verb: Option<String>,
    pub object: Option<String>,
    pub course_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CourseAggregate {
    completion: f64,
    average_score: Option<f64>,
    time_spent_seconds: i64,
    enrollments: i64,
}

pub struct AnalyticsAggregator {
    pool: SqlitePool,
    identity: Arc<dyn IdentityProvider>,
    catalog: Arc<dyn ContentCatalog>,
}

impl AnalyticsAggregator {
    pub fn new(
        pool: SqlitePool,
        identity: Arc<dyn IdentityProvider>,
        catalog: Arc<dyn ContentCatalog>,
    ) -> Self {
        Self {
            pool,
            identity,
            catalog,
        }
    }

    pub async fn total_learners(&self) -> Result<i64> {
        self.identity.count_learners().await
    }

    /// Mean enrollment progress, `0.0` when there are no enrollments
    pub async fn average_completion(&self, course_id: Option<&str>) -> Result<f64> {
        self.enrollment_average("progress", course_id).await
    }

    /// Mean enrollment score over scored enrollments, `0.0` when none are scored
    pub async fn average_score(&self, course_id: Option<&str>) -> Result<f64> {
        self.enrollment_average("score", course_id).await
    }

    pub async fn total_statements(&self, course_id: Option<&str>) -> Result<i64> {
        statements::count(&self.pool, course_id).await
    }

    /// One entry per learner, best completion first, unenrolled learners last
    pub async fn leaderboard(&self, course_id: Option<&str>, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let learners = self.identity.list_learners().await?;

        let sql = format!(
            "SELECT learner_id, AVG(progress) AS completion, AVG(score) AS score
             FROM enrollments {} GROUP BY learner_id",
            course_filter(course_id)
        );
        let mut query = sqlx::query(&sql);
        if let Some(course_id) = course_id {
            query = query.bind(course_id);
        }
        let stats: HashMap<String, (Option<f64>, Option<f64>)> = query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| (row.get("learner_id"), (row.get("completion"), row.get("score"))))
            .collect();

        let entries = learners
            .into_iter()
            .map(|learner| {
                let (completion, score) = stats.get(&learner.id).copied().unwrap_or((None, None));
                LeaderboardEntry {
                    user_id: learner.id,
                    name: learner.name,
                    completion,
                    score,
                }
            })
            .collect();

        Ok(rank_leaderboard(entries, limit))
    }

    /// Per-course rollup, catalog courses first-class, ordered by title then id
    pub async fn course_breakdown(&self, course_id: Option<&str>) -> Result<Vec<CourseBreakdown>> {
        let sql = format!(
            "SELECT course_id, AVG(progress) AS completion, AVG(score) AS average_score,
                    SUM(time_spent_seconds) AS time_spent_seconds, COUNT(*) AS enrollments
             FROM enrollments {} GROUP BY course_id",
            course_filter(course_id)
        );
        let mut query = sqlx::query(&sql);
        if let Some(course_id) = course_id {
            query = query.bind(course_id);
        }
        let mut aggregates: HashMap<String, CourseAggregate> = query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| {
                let completion: Option<f64> = row.get("completion");
                let time_spent: Option<i64> = row.get("time_spent_seconds");
                (
                    row.get("course_id"),
                    CourseAggregate {
                        completion: completion.unwrap_or(0.0),
                        average_score: row.get("average_score"),
                        time_spent_seconds: time_spent.unwrap_or(0),
                        enrollments: row.get("enrollments"),
                    },
                )
            })
            .collect();

        let mut breakdown: Vec<CourseBreakdown> = self
            .catalog
            .courses()
            .await?
            .into_iter()
            .filter(|course| course_id.map_or(true, |id| id == course.id))
            .map(|course| {
                let aggregate = aggregates.remove(&course.id).unwrap_or_default();
                breakdown_entry(course.id, Some(course.title), aggregate)
            })
            .collect();

        breakdown.extend(
            aggregates
                .into_iter()
                .map(|(id, aggregate)| breakdown_entry(id, None, aggregate)),
        );

        breakdown.sort_by(|a, b| {
            (a.title.is_none(), &a.title, &a.course_id).cmp(&(b.title.is_none(), &b.title, &b.course_id))
        });

        Ok(breakdown)
    }

    /// Every rollup at once; a failing rollup is logged and left at its default
    pub async fn summary(&self, course_id: Option<&str>) -> AnalyticsSummary {
        let (learners, completion, score, statements, leaderboard, breakdown) = tokio::join!(
            self.total_learners(),
            self.average_completion(course_id),
            self.average_score(course_id),
            self.total_statements(course_id),
            self.leaderboard(course_id, DEFAULT_LEADERBOARD_LIMIT),
            self.course_breakdown(course_id),
        );

        AnalyticsSummary {
            total_learners: or_default("total_learners", learners),
            average_completion: or_default("average_completion", completion),
            average_score: or_default("average_score", score),
            total_statements: or_default("total_statements", statements),
            leaderboard: or_default("leaderboard", leaderboard),
            course_breakdown: or_default("course_breakdown", breakdown),
        }
    }

    /// Enrollments and recent activity of one learner
    pub async fn learner_dashboard(&self, learner: &Identity) -> Result<LearnerDashboard> {
        let titles: HashMap<String, String> = self
            .catalog
            .courses()
            .await?
            .into_iter()
            .map(|course| (course.id, course.title))
            .collect();

        let items = enrollments::list_for_learner(&self.pool, &learner.id)
            .await?
            .into_iter()
            .map(|enrollment| DashboardItem {
                title: titles.get(&enrollment.course_id).cloned(),
                course_id: enrollment.course_id,
                progress: enrollment.progress,
                score: enrollment.score,
                status: enrollment.status,
                time_spent_minutes: enrollment.time_spent_seconds as f64 / 60.0,
            })
            .collect();

        let recent_statements =
            statements::recent_for_learner(&self.pool, &learner.id, DASHBOARD_STATEMENT_LIMIT)
                .await?
                .into_iter()
                .map(|entry| RecentStatement {
                    id: entry.statement_id,
                    verb: entry.verb,
                    object: entry.object_id,
                    course_id: entry.course_id,
                    timestamp: entry.recorded_at,
                })
                .collect();

        Ok(LearnerDashboard {
            learner_name: learner.name.clone(),
            items,
            recent_statements,
        })
    }

    async fn enrollment_average(&self, column: &str, course_id: Option<&str>) -> Result<f64> {
        let sql = format!(
            "SELECT AVG({}) FROM enrollments {}",
            column,
            course_filter(course_id)
        );
        let mut query = sqlx::query_scalar::<_, Option<f64>>(&sql);
        if let Some(course_id) = course_id {
            query = query.bind(course_id);
        }

        Ok(query.fetch_one(&self.pool).await?.unwrap_or(0.0))
    }
}

fn course_filter(course_id: Option<&str>) -> &'static str {
    if course_id.is_some() {
        "WHERE course_id = ?"
    } else {
        ""
    }
}

fn breakdown_entry(course_id: String, title: Option<String>, aggregate: CourseAggregate) -> CourseBreakdown {
    CourseBreakdown {
        course_id,
        title,
        completion: aggregate.completion,
        average_score: aggregate.average_score,
        time_spent_minutes: aggregate.time_spent_seconds as f64 / 60.0,
        enrollments: aggregate.enrollments,
    }
}

/// Completion descending with `None` last, ties by learner id, then truncate
fn rank_leaderboard(mut entries: Vec<LeaderboardEntry>, limit: usize) -> Vec<LeaderboardEntry> {
    entries.sort_by(|a, b| {
        let by_completion = match (a.completion, b.completion) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_completion.then_with(|| a.user_id.cmp(&b.user_id))
    });
    entries.truncate(limit);
    entries
}

fn or_default<T: Default>(rollup: &str, result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(rollup, error = %e, "Analytics rollup failed, using default");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, completion: Option<f64>) -> LeaderboardEntry {
        LeaderboardEntry {
            user_id: id.to_string(),
            name: id.to_uppercase(),
            completion,
            score: None,
        }
    }

    #[test]
    fn test_rank_orders_by_completion_then_id() {
        let ranked = rank_leaderboard(
            vec![
                entry("c", Some(40.0)),
                entry("a", None),
                entry("b", Some(90.0)),
                entry("d", Some(40.0)),
            ],
            10,
        );

        let ids: Vec<&str> = ranked.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "d", "a"]);
    }

    #[test]
    fn test_rank_truncates() {
        let entries = (0..15).map(|i| entry(&format!("u{:02}", i), Some(i as f64))).collect();
        let ranked = rank_leaderboard(entries, DEFAULT_LEADERBOARD_LIMIT);
        assert_eq!(ranked.len(), 10);
        assert_eq!(ranked[0].user_id, "u14");
    }

    #[test]
    fn test_failed_rollup_degrades_to_default() {
        let failed: Result<Vec<LeaderboardEntry>> = Err(crate::Error::Internal("boom".to_string()));
        assert!(or_default("leaderboard", failed).is_empty());
        assert_eq!(or_default("average_score", Ok(72.5)), 72.5);
    }
}
