//! Persisted shapes: progress records, statement log entries, enrollments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Categorical progress of a learner through one unit or course
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not-started",
            ProgressStatus::InProgress => "in-progress",
            ProgressStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressStatus {
    type Err = crate::Error;

    /// Accepts the kebab-case names plus spaced or snake_case spellings
    /// ("in progress", "not_started") that older clients send.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '_' { '-' } else { c })
            .collect();

        match normalized.as_str() {
            "not-started" => Ok(ProgressStatus::NotStarted),
            "in-progress" => Ok(ProgressStatus::InProgress),
            "completed" => Ok(ProgressStatus::Completed),
            _ => Err(crate::Error::Validation(format!(
                "Unknown status '{}' (expected not-started, in-progress or completed)",
                s
            ))),
        }
    }
}

/// Catalog context joined onto a progress record when the lesson is known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonContext {
    pub id: String,
    pub title: String,
    pub course_id: Option<String>,
    pub course_title: Option<String>,
}

/// Current state of one (learner, lesson) pair in the Progress Ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub id: String,
    pub learner_id: String,
    pub lesson_id: String,
    pub status: ProgressStatus,
    pub score: Option<u8>,
    pub passed: Option<bool>,
    pub completion: Option<u8>,
    /// Most recent statement that produced this state (lookup only)
    pub xapi_statement_id: Option<String>,
    pub last_event_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub lesson: Option<LessonContext>,
}

/// One immutable entry of the Statement Log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementLogEntry {
    pub statement_id: String,
    pub learner_id: String,
    pub object_id: Option<String>,
    pub verb: Option<String>,
    pub course_id: Option<String>,
    pub module_id: Option<String>,
    pub score: Option<f64>,
    pub duration_seconds: Option<i64>,
    pub raw_event: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Per (learner, course) rollup maintained by the monotonic merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentSummary {
    pub id: String,
    pub learner_id: String,
    pub course_id: String,
    pub status: ProgressStatus,
    pub progress: f64,
    pub score: Option<f64>,
    pub time_spent_seconds: i64,
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_kebab_case() {
        let json = serde_json::to_string(&ProgressStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        let back: ProgressStatus = serde_json::from_str("\"not-started\"").unwrap();
        assert_eq!(back, ProgressStatus::NotStarted);
    }

    #[test]
    fn test_status_parse_accepts_legacy_spellings() {
        assert_eq!("in progress".parse::<ProgressStatus>().unwrap(), ProgressStatus::InProgress);
        assert_eq!("Not_Started".parse::<ProgressStatus>().unwrap(), ProgressStatus::NotStarted);
        assert_eq!(" completed ".parse::<ProgressStatus>().unwrap(), ProgressStatus::Completed);
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        let err = "paused".parse::<ProgressStatus>().unwrap_err();
        assert!(matches!(err, crate::Error::Validation(_)));
    }
}
