//! Progress state and its reducer
//!
//! Every change to [`ProgressState`] goes through [`reduce`], both for live
//! transitions and for rehydration, so a reloaded state is always one the
//! live rules could have produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Learner the cache reports for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    /// Learner id sent as `learnerId`
    pub id: String,
    pub name: String,
    pub mbox: String,
}

impl Default for Actor {
    fn default() -> Self {
        Self {
            id: "learner-one".to_string(),
            name: "Learner One".to_string(),
            mbox: "mailto:learner.one@example.com".to_string(),
        }
    }
}

/// When a transition happened and the statement id it was forwarded under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub statement_id: String,
    pub timestamp: DateTime<Utc>,
}

impl TransitionRecord {
    /// Fresh record stamped now with a new statement id
    pub fn now() -> Self {
        Self {
            statement_id: uuid::Uuid::new_v4().to_string(),
            timestamp: ethica_common::time::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRecord {
    pub response: String,
    pub correct: bool,
    #[serde(flatten)]
    pub transition: TransitionRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    #[serde(default)]
    pub actor: Actor,
    #[serde(default)]
    pub viewed_modules: BTreeMap<String, TransitionRecord>,
    #[serde(default)]
    pub assessments: BTreeMap<String, AssessmentRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<TransitionRecord>,
}

impl ProgressState {
    pub fn is_completed(&self) -> bool {
        self.completed.is_some()
    }

    pub fn has_viewed(&self, slug: &str) -> bool {
        self.viewed_modules.contains_key(slug)
    }

    /// Actions that rebuild this state from the default one
    ///
    /// Actor first, then views, answers and completion, each group in slug
    /// order.
    pub fn replay_actions(&self) -> Vec<ProgressAction> {
        let mut actions = Vec::with_capacity(2 + self.viewed_modules.len() + self.assessments.len());
        actions.push(ProgressAction::SetActor {
            actor: self.actor.clone(),
        });

        for (slug, record) in &self.viewed_modules {
            actions.push(ProgressAction::ViewModule {
                slug: slug.clone(),
                record: record.clone(),
            });
        }

        for (slug, record) in &self.assessments {
            actions.push(ProgressAction::AnswerAssessment {
                slug: slug.clone(),
                record: record.clone(),
            });
        }

        if let Some(record) = &self.completed {
            actions.push(ProgressAction::Complete {
                record: record.clone(),
            });
        }

        actions
    }

    /// Replay `stored` through the reducer onto a default state
    pub fn rehydrate(stored: &ProgressState) -> ProgressState {
        stored
            .replay_actions()
            .into_iter()
            .fold(ProgressState::default(), reduce)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProgressAction {
    SetActor { actor: Actor },
    ViewModule { slug: String, record: TransitionRecord },
    AnswerAssessment { slug: String, record: AssessmentRecord },
    Complete { record: TransitionRecord },
}

/// Apply one action
///
/// Viewing a module twice, repeating the same answer, and completing twice
/// all return the state unchanged. A different answer replaces the stored
/// one.
pub fn reduce(mut state: ProgressState, action: ProgressAction) -> ProgressState {
    match action {
        ProgressAction::SetActor { actor } => {
            state.actor = actor;
        }
        ProgressAction::ViewModule { slug, record } => {
            state.viewed_modules.entry(slug).or_insert(record);
        }
        ProgressAction::AnswerAssessment { slug, record } => {
            let unchanged = state
                .assessments
                .get(&slug)
                .is_some_and(|existing| existing.response == record.response);
            if !unchanged {
                state.assessments.insert(slug, record);
            }
        }
        ProgressAction::Complete { record } => {
            if state.completed.is_none() {
                state.completed = Some(record);
            }
        }
    }
    state
}
