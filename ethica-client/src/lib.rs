//! ethica-client - local mirror of one learner's course progress
//!
//! Transitions are applied to a [`ProgressState`] through a pure reducer,
//! persisted to a JSON file, then forwarded to the tracking service without
//! blocking the caller. The server ledger stays authoritative for analytics;
//! this cache is authoritative for the current device.

pub mod cache;
pub mod error;
pub mod sink;
pub mod state;

pub use cache::{CacheOptions, ProgressCache};
pub use error::{ClientError, Result};
pub use sink::{HttpStatementSink, StatementSink};
pub use state::{reduce, Actor, AssessmentRecord, ProgressAction, ProgressState, TransitionRecord};
