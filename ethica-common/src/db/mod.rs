//! Database initialization, migrations and lock retry

pub mod init;
pub mod migrations;
pub mod retry;

pub use init::init_database;
pub use migrations::{get_schema_version, run_migrations};
pub use retry::retry_on_lock;
