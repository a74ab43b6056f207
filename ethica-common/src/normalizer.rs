//! Event Normalizer
//!
//! Maps an inbound event into the canonical fields the tracker persists.
//! An event is either an explicit `{status, score, passed, completion}` tuple,
//! a verb-based learning-record statement (`xapiEvent`) or both; explicit
//! values always win over values inferred from the statement.
//!
//! Every `derive_*` function is pure and total: odd payload shapes (a string
//! where a number was expected, a zero `max`, an unparseable timestamp) fall
//! through to the next rule instead of failing.

use crate::models::ProgressStatus;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// IRI prefix of the ADL verb vocabulary
pub const ADL_VERB_PREFIX: &str = "http://adlnet.gov/expapi/verbs/";

/// Verbs with a defined meaning for progress tracking
///
/// Parsed from a full ADL IRI or from the bare verb name. Anything else is
/// `Other` and maps to in-progress, so no event is ever dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Initialized,
    Progressed,
    Answered,
    Viewed,
    Experienced,
    Completed,
    Passed,
    Failed,
    Other(String),
}

impl Verb {
    pub fn parse(id: &str) -> Self {
        let trimmed = id.trim();
        let name = trimmed.strip_prefix(ADL_VERB_PREFIX).unwrap_or(trimmed);
        match name {
            "initialized" => Verb::Initialized,
            "progressed" => Verb::Progressed,
            "answered" => Verb::Answered,
            "viewed" => Verb::Viewed,
            "experienced" => Verb::Experienced,
            "completed" => Verb::Completed,
            "passed" => Verb::Passed,
            "failed" => Verb::Failed,
            _ => Verb::Other(trimmed.to_string()),
        }
    }

    /// Unit-level status implied by the verb
    pub fn status(&self) -> ProgressStatus {
        match self {
            Verb::Initialized
            | Verb::Progressed
            | Verb::Answered
            | Verb::Viewed
            | Verb::Experienced => ProgressStatus::InProgress,
            Verb::Completed | Verb::Passed | Verb::Failed => ProgressStatus::Completed,
            Verb::Other(_) => ProgressStatus::InProgress,
        }
    }

    /// Course progress percentage a single activity with this verb is worth
    ///
    /// Feeds the monotonic enrollment merge, not the unit ledger.
    pub fn course_weight(&self) -> f64 {
        match self {
            Verb::Completed => 100.0,
            Verb::Experienced => 50.0,
            Verb::Initialized
            | Verb::Progressed
            | Verb::Answered
            | Verb::Viewed
            | Verb::Passed
            | Verb::Failed
            | Verb::Other(_) => 10.0,
        }
    }

    /// Full IRI for the ADL verbs, the original text otherwise
    pub fn iri(&self) -> String {
        match self {
            Verb::Other(raw) => raw.clone(),
            known => format!("{}{}", ADL_VERB_PREFIX, known.name()),
        }
    }

    /// Short display name
    pub fn name(&self) -> &str {
        match self {
            Verb::Initialized => "initialized",
            Verb::Progressed => "progressed",
            Verb::Answered => "answered",
            Verb::Viewed => "viewed",
            Verb::Experienced => "experienced",
            Verb::Completed => "completed",
            Verb::Passed => "passed",
            Verb::Failed => "failed",
            Verb::Other(raw) => raw.as_str(),
        }
    }
}

/// Inbound progress event as posted by clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub learner_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub completion: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xapi_event: Option<XApiEvent>,
}

impl ProgressEvent {
    /// Event for a (learner, lesson) pair with nothing else set
    pub fn for_lesson(learner_id: impl Into<String>, lesson_id: impl Into<String>) -> Self {
        Self {
            learner_id: Some(learner_id.into()),
            lesson_id: Some(lesson_id.into()),
            ..Default::default()
        }
    }

    pub fn with_xapi_event(mut self, event: XApiEvent) -> Self {
        self.xapi_event = Some(event);
        self
    }

    fn verb(&self) -> Option<Verb> {
        self.xapi_event
            .as_ref()
            .and_then(|e| e.verb_id())
            .map(Verb::parse)
    }

    fn result(&self) -> Option<&XApiResult> {
        self.xapi_event.as_ref().and_then(|e| e.view.result.as_ref())
    }
}

/// Learning-record statement carried inside a [`ProgressEvent`]
///
/// Keeps the payload exactly as received (for the audit log) next to a typed
/// view of the few fields the normalizer reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct XApiEvent {
    raw: Value,
    view: XApiView,
}

impl XApiEvent {
    pub fn from_value(raw: Value) -> Result<Self> {
        Self::try_from(raw).map_err(|e| Error::Validation(format!("Invalid xapiEvent: {}", e)))
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn id(&self) -> Option<&str> {
        self.view.id.as_deref().filter(|id| !id.trim().is_empty())
    }

    pub fn verb_id(&self) -> Option<&str> {
        self.view.verb.as_deref()
    }

    pub fn object_id(&self) -> Option<&str> {
        self.view.object.as_deref()
    }

    pub fn result(&self) -> Option<&XApiResult> {
        self.view.result.as_ref()
    }
}

impl TryFrom<Value> for XApiEvent {
    type Error = serde_json::Error;

    fn try_from(raw: Value) -> std::result::Result<Self, Self::Error> {
        let view = XApiView::deserialize(&raw)?;
        Ok(Self { raw, view })
    }
}

impl From<XApiEvent> for Value {
    fn from(event: XApiEvent) -> Self {
        event.raw
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct XApiView {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_reference")]
    verb: Option<String>,
    #[serde(default, deserialize_with = "lenient_reference")]
    object: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    result: Option<XApiResult>,
    #[serde(default, deserialize_with = "lenient_string")]
    timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    stored: Option<String>,
}

/// Outcome block of a statement
///
/// Score fields may be nested under `score` (xAPI) or inline; nested values
/// win field by field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct XApiResult {
    #[serde(default, deserialize_with = "lenient")]
    pub score: Option<ScoreFields>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub raw: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub scaled: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub completion: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub success: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub response: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScoreFields {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub raw: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub scaled: Option<f64>,
}

impl XApiResult {
    pub fn score_fields(&self) -> ScoreFields {
        let nested = self.score.clone().unwrap_or_default();
        ScoreFields {
            raw: nested.raw.or(self.raw),
            max: nested.max.or(self.max),
            min: nested.min.or(self.min),
            scaled: nested.scaled.or(self.scaled),
        }
    }
}

/// Canonical fields consumed by the tracker
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub status: ProgressStatus,
    pub score: Option<u8>,
    pub passed: Option<bool>,
    pub completion: Option<u8>,
    pub event_at: DateTime<Utc>,
    /// Present exactly when the event carried a statement
    pub statement_id: Option<String>,
    pub verb: Option<String>,
    pub object_id: Option<String>,
    pub raw_event: Option<Value>,
}

/// Status: explicit value, else the verb table, else in-progress
///
/// Only an explicit status that names no known state is an error.
pub fn derive_status(event: &ProgressEvent) -> Result<ProgressStatus> {
    if let Some(status) = event.status.as_deref().filter(|s| !s.trim().is_empty()) {
        return status.parse();
    }

    Ok(event
        .verb()
        .map(|verb| verb.status())
        .unwrap_or(ProgressStatus::InProgress))
}

/// Completion percentage: clamped explicit number, else result flag, else none
pub fn derive_completion(event: &ProgressEvent) -> Option<u8> {
    if let Some(completion) = event.completion {
        return Some(to_percent(completion));
    }

    event
        .result()
        .and_then(|result| result.completion)
        .map(|done| if done { 100 } else { 0 })
}

/// Score percentage: explicit, else scaled, else raw/max, else none
pub fn derive_score(event: &ProgressEvent) -> Option<u8> {
    if let Some(score) = event.score {
        return Some(to_percent(score));
    }

    let fields = event.result()?.score_fields();

    if let Some(scaled) = fields.scaled {
        return Some(to_percent(scaled * 100.0));
    }

    match (fields.raw, fields.max) {
        (Some(raw), Some(max)) if max != 0.0 => Some(to_percent(raw / max * 100.0)),
        _ => None,
    }
}

/// Pass flag: explicit, else result success, else true when completed
///
/// Completion without pass/fail information counts as a pass.
pub fn derive_passed(event: &ProgressEvent, status: ProgressStatus) -> Option<bool> {
    if let Some(passed) = event.passed {
        return Some(passed);
    }

    if let Some(success) = event.result().and_then(|result| result.success) {
        return Some(success);
    }

    if status == ProgressStatus::Completed {
        return Some(true);
    }

    None
}

/// Source event time: statement timestamp, else stored, else `now`
pub fn derive_timestamp(event: &ProgressEvent, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(xapi) = event.xapi_event.as_ref() else {
        return now;
    };

    [xapi.view.timestamp.as_deref(), xapi.view.stored.as_deref()]
        .into_iter()
        .flatten()
        .find_map(crate::time::parse_client_timestamp)
        .unwrap_or(now)
}

/// Run every derivation and pick the statement id
///
/// A statement without an id gets a fresh uuid; no statement, no id.
pub fn normalize(event: &ProgressEvent, now: DateTime<Utc>) -> Result<NormalizedEvent> {
    let status = derive_status(event)?;
    let xapi = event.xapi_event.as_ref();

    Ok(NormalizedEvent {
        status,
        score: derive_score(event),
        passed: derive_passed(event, status),
        completion: derive_completion(event),
        event_at: derive_timestamp(event, now),
        statement_id: xapi.map(|e| {
            e.id()
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string())
        }),
        verb: xapi.and_then(|e| e.verb_id()).map(str::to_string),
        object_id: xapi.and_then(|e| e.object_id()).map(str::to_string),
        raw_event: xapi.map(|e| e.raw().clone()),
    })
}

fn to_percent(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

// Lenient field readers: a value of the wrong JSON type reads as absent.

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// `{"id": "..."}` or a bare string
fn lenient_reference<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    })
}

fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}
