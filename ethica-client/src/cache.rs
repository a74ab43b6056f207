//! Persistent progress cache with fire-and-forget forwarding
//!
//! Each user action runs three steps in order: reduce, persist, forward.
//! The first two complete before the call returns. Forwarding runs on a
//! spawned task whose handle is handed back; a failed forward only sets the
//! status message and never touches local state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ethica_common::normalizer::{ProgressEvent, Verb, XApiEvent};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::sink::StatementSink;
use crate::state::{reduce, Actor, AssessmentRecord, ProgressAction, ProgressState, TransitionRecord};

/// Course the cache tracks and the IRI root for activity ids
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub course_id: String,
    pub course_title: String,
    pub activity_root: String,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            course_id: "ethics-compliance".to_string(),
            course_title: "Ethics & Compliance Foundations".to_string(),
            activity_root: "https://example.com".to_string(),
        }
    }
}

pub struct ProgressCache {
    store_path: PathBuf,
    options: CacheOptions,
    state: ProgressState,
    sink: Option<Arc<dyn StatementSink>>,
    status: Arc<RwLock<Option<String>>>,
}

impl ProgressCache {
    /// Load the stored state, replaying it through the reducer
    ///
    /// A missing store starts from the default state. An unreadable one is
    /// logged and replaced on the next transition.
    pub async fn open(
        store_path: impl Into<PathBuf>,
        options: CacheOptions,
        sink: Option<Arc<dyn StatementSink>>,
    ) -> Result<Self> {
        let store_path = store_path.into();
        let state = match load_state(&store_path).await? {
            Some(stored) => {
                let state = ProgressState::rehydrate(&stored);
                info!(
                    path = %store_path.display(),
                    modules = state.viewed_modules.len(),
                    assessments = state.assessments.len(),
                    completed = state.is_completed(),
                    "Rehydrated progress cache"
                );
                state
            }
            None => ProgressState::default(),
        };

        Ok(Self {
            store_path,
            options,
            state,
            sink,
            status: Arc::new(RwLock::new(None)),
        })
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Last forwarding problem, cleared by the next successful forward
    pub async fn status_message(&self) -> Option<String> {
        self.status.read().await.clone()
    }

    pub async fn set_actor(&mut self, actor: Actor) -> Result<()> {
        self.dispatch(ProgressAction::SetActor { actor }).await?;
        Ok(())
    }

    /// Mark a module viewed; a repeat view is a no-op and sends nothing
    pub async fn view_module(&mut self, slug: &str) -> Result<Option<JoinHandle<()>>> {
        if self.state.has_viewed(slug) {
            return Ok(None);
        }

        let action = ProgressAction::ViewModule {
            slug: slug.to_string(),
            record: TransitionRecord::now(),
        };
        if !self.dispatch(action).await? {
            return Ok(None);
        }

        let record = &self.state.viewed_modules[slug];
        let event = self.view_event(slug, record)?;
        Ok(self.forward(vec![event]))
    }

    /// Record an assessment answer; repeating the stored response is a no-op
    pub async fn answer_assessment(
        &mut self,
        slug: &str,
        response: &str,
        correct: bool,
    ) -> Result<Option<JoinHandle<()>>> {
        let action = ProgressAction::AnswerAssessment {
            slug: slug.to_string(),
            record: AssessmentRecord {
                response: response.to_string(),
                correct,
                transition: TransitionRecord::now(),
            },
        };
        if !self.dispatch(action).await? {
            return Ok(None);
        }

        let record = &self.state.assessments[slug];
        let event = self.answer_event(slug, record)?;
        Ok(self.forward(vec![event]))
    }

    /// Mark the course completed once
    pub async fn complete(&mut self) -> Result<Option<JoinHandle<()>>> {
        let action = ProgressAction::Complete {
            record: TransitionRecord::now(),
        };
        if !self.dispatch(action).await? {
            return Ok(None);
        }

        let event = match &self.state.completed {
            Some(record) => self.complete_event(record)?,
            None => return Ok(None),
        };
        Ok(self.forward(vec![event]))
    }

    /// Re-send every known transition under its original statement id
    pub fn resync(&self) -> Result<Option<JoinHandle<()>>> {
        let mut events = Vec::new();
        for (slug, record) in &self.state.viewed_modules {
            events.push(self.view_event(slug, record)?);
        }
        for (slug, record) in &self.state.assessments {
            events.push(self.answer_event(slug, record)?);
        }
        if let Some(record) = &self.state.completed {
            events.push(self.complete_event(record)?);
        }

        if events.is_empty() {
            return Ok(None);
        }
        debug!(count = events.len(), "Resyncing progress events");
        Ok(self.forward(events))
    }

    /// Reduce and persist; true when the state changed
    async fn dispatch(&mut self, action: ProgressAction) -> Result<bool> {
        let next = reduce(self.state.clone(), action);
        if next == self.state {
            return Ok(false);
        }

        self.state = next;
        save_state(&self.store_path, &self.state).await?;
        Ok(true)
    }

    fn forward(&self, events: Vec<ProgressEvent>) -> Option<JoinHandle<()>> {
        let sink = self.sink.clone()?;
        let status = Arc::clone(&self.status);

        Some(tokio::spawn(async move {
            for event in &events {
                if let Err(e) = sink.send(event).await {
                    warn!(lesson_id = ?event.lesson_id, error = %e, "Progress forward failed");
                    *status.write().await =
                        Some(format!("Saved locally; sync with server failed: {}", e));
                    return;
                }
            }
            *status.write().await = None;
        }))
    }

    fn view_event(&self, slug: &str, record: &TransitionRecord) -> Result<ProgressEvent> {
        let statement = json!({
            "id": record.statement_id,
            "actor": self.actor_json(),
            "verb": verb_json(&Verb::Viewed),
            "object": {
                "id": format!("{}/modules/{}", self.options.activity_root, slug),
                "definition": { "name": { "en-US": format!("Module {}", slug) } }
            },
            "timestamp": record.timestamp.to_rfc3339(),
        });
        self.event_for(slug, statement)
    }

    fn answer_event(&self, slug: &str, record: &AssessmentRecord) -> Result<ProgressEvent> {
        let statement = json!({
            "id": record.transition.statement_id,
            "actor": self.actor_json(),
            "verb": verb_json(&Verb::Answered),
            "object": {
                "id": format!("{}/assessments/{}", self.options.activity_root, slug),
                "definition": { "name": { "en-US": format!("Assessment {}", slug) } }
            },
            "result": {
                "response": record.response,
                "success": record.correct,
                "completion": true
            },
            "timestamp": record.transition.timestamp.to_rfc3339(),
        });
        self.event_for(slug, statement)
    }

    fn complete_event(&self, record: &TransitionRecord) -> Result<ProgressEvent> {
        let course_id = &self.options.course_id;
        let statement = json!({
            "id": record.statement_id,
            "actor": self.actor_json(),
            "verb": verb_json(&Verb::Completed),
            "object": {
                "id": format!("{}/courses/{}", self.options.activity_root, course_id),
                "definition": { "name": { "en-US": self.options.course_title } }
            },
            "timestamp": record.timestamp.to_rfc3339(),
        });
        self.event_for(course_id, statement)
    }

    fn event_for(&self, lesson_id: &str, statement: Value) -> Result<ProgressEvent> {
        let xapi_event = XApiEvent::from_value(statement)?;
        Ok(ProgressEvent::for_lesson(self.state.actor.id.clone(), lesson_id).with_xapi_event(xapi_event))
    }

    fn actor_json(&self) -> Value {
        json!({
            "name": self.state.actor.name,
            "mbox": self.state.actor.mbox,
        })
    }
}

fn verb_json(verb: &Verb) -> Value {
    json!({
        "id": verb.iri(),
        "display": { "en-US": verb.name() }
    })
}

/// Stored state, `None` when missing or unreadable
async fn load_state(path: &Path) -> Result<Option<ProgressState>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str(&content) {
        Ok(state) => Ok(Some(state)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Discarding unreadable progress store");
            Ok(None)
        }
    }
}

/// Write to a sibling temp file, then rename over the store
async fn save_state(path: &Path, state: &ProgressState) -> Result<()> {
    let content = serde_json::to_vec_pretty(state)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
