//! ethica-server library - progress tracking HTTP service
//!
//! Exposes the tracker, analytics and identity collaborators over axum.
//! Public routes accept progress events; learner and admin routes require a
//! bearer token resolved by the identity provider.

use axum::Router;
use ethica_common::analytics::AnalyticsAggregator;
use ethica_common::catalog::{ContentCatalog, SqliteContentCatalog};
use ethica_common::identity::{IdentityProvider, SqliteIdentityStore};
use ethica_common::tracker::ProgressTracker;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<ProgressTracker>,
    pub aggregator: Arc<AnalyticsAggregator>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        identity: Arc<dyn IdentityProvider>,
        catalog: Arc<dyn ContentCatalog>,
        max_lock_wait_ms: u64,
    ) -> Self {
        Self {
            tracker: Arc::new(ProgressTracker::new(pool.clone(), catalog.clone(), max_lock_wait_ms)),
            aggregator: Arc::new(AnalyticsAggregator::new(pool, identity.clone(), catalog)),
            identity,
        }
    }

    /// State backed entirely by the service database
    pub async fn with_sqlite(
        pool: SqlitePool,
        token_ttl_hours: i64,
        max_lock_wait_ms: u64,
    ) -> ethica_common::Result<Self> {
        let identity = Arc::new(SqliteIdentityStore::open(pool.clone(), token_ttl_hours).await?);
        let catalog = Arc::new(SqliteContentCatalog::new(pool.clone()));
        Ok(Self::new(pool, identity, catalog, max_lock_wait_ms))
    }
}

/// Build application router
pub fn build_router(state: AppState, cors_permissive: bool) -> Router {
    use axum::middleware;
    use axum::routing::{delete, get, post};

    let admin = Router::new()
        .route("/api/admin/analytics", get(api::admin_analytics))
        .route("/api/admin/learners/:learner_id/records", delete(api::purge_learner))
        .route("/api/admin/courses/:course_id/records", delete(api::purge_course))
        .layer(middleware::from_fn_with_state(state.clone(), api::require_admin));

    let learner = Router::new()
        .route("/api/xapi/statements", post(api::record_statement))
        .route("/api/dashboard/summary", get(api::dashboard_summary))
        .layer(middleware::from_fn_with_state(state.clone(), api::require_identity));

    let public = Router::new()
        .route("/api/progress", post(api::record_progress).get(api::query_progress))
        .route("/api/auth/login", post(api::login))
        .route("/build_info", get(api::get_build_info))
        .merge(api::health_routes());

    let router = Router::new()
        .merge(admin)
        .merge(learner)
        .merge(public)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_permissive {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
