//! # Ethica Common Library
//!
//! Progress tracking core shared by the Ethica services:
//! - Event normalization (status, score, completion, pass flag, event time)
//! - Progress Ledger, Statement Log and enrollment summaries on SQLite
//! - Progress Tracker (write orchestration, course activity, purge)
//! - Analytics Aggregator and compliance exports
//! - Identity and content catalog collaborators
//! - Configuration loading and database initialization

pub mod analytics;
pub mod catalog;
pub mod config;
pub mod db;
pub mod enrollments;
pub mod error;
pub mod export;
pub mod identity;
pub mod ledger;
pub mod models;
pub mod normalizer;
pub mod statements;
pub mod time;
pub mod tracker;

pub use error::{Error, Result};
