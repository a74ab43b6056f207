//! HTTP API handlers for ethica-server

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod buildinfo;
pub mod dashboard;
pub mod health;
pub mod progress;
pub mod statements;

pub use admin::{purge_course, purge_learner};
pub use analytics::admin_analytics;
pub use auth::{login, require_admin, require_identity};
pub use buildinfo::get_build_info;
pub use dashboard::dashboard_summary;
pub use health::health_routes;
pub use progress::{query_progress, record_progress};
pub use statements::record_statement;
