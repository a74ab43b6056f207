//! Integration tests for ethica-server API endpoints
//!
//! Each test builds the router over a fresh database in a temp directory and
//! drives it with `oneshot`.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use ethica_common::catalog::SqliteContentCatalog;
use ethica_common::config::DatabaseConfig;
use ethica_common::db::init_database;
use ethica_common::identity::{Identity, Role, SqliteIdentityStore};
use ethica_server::{build_router, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

struct TestApp {
    _dir: TempDir,
    router: Router,
    identity: Arc<SqliteIdentityStore>,
    catalog: Arc<SqliteContentCatalog>,
}

async fn setup_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("ethica.db"), &DatabaseConfig::default())
        .await
        .unwrap();

    let identity = Arc::new(SqliteIdentityStore::open(pool.clone(), 12).await.unwrap());
    let catalog = Arc::new(SqliteContentCatalog::new(pool.clone()));
    let state = AppState::new(pool, identity.clone(), catalog.clone(), 1000);

    TestApp {
        _dir: dir,
        router: build_router(state, false),
        identity,
        catalog,
    }
}

async fn register(app: &TestApp, name: &str, role: Role) -> Identity {
    let email = format!("{}@example.com", name.to_lowercase());
    app.identity
        .register(name, &email, "correct-horse", role)
        .await
        .unwrap()
}

async fn login_token(app: &TestApp, email: &str) -> String {
    let (status, body) = send(
        app,
        json_request("POST", "/api/auth/login", json!({ "email": email, "password": "correct-horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

fn test_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    authed_json_request(method, uri, body, None)
}

fn authed_json_request(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Should parse JSON")
    };
    (status, body)
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let app = setup_app().await;
    let (status, body) = send(&app, test_request("GET", "/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "ethica-server");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_build_info() {
    let app = setup_app().await;
    let (status, body) = send(&app, test_request("GET", "/build_info", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["gitHash"].is_string());
}

// =============================================================================
// Progress
// =============================================================================

#[tokio::test]
async fn test_record_progress_creates_record() {
    let app = setup_app().await;
    app.catalog.put_course("c1", "Ethics 101").await.unwrap();
    app.catalog.put_lesson("l1", Some("c1"), "Conflicts of Interest").await.unwrap();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/progress",
            json!({ "learnerId": "u1", "lessonId": "l1", "status": "completed", "score": 88 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["progress"]["learnerId"], "u1");
    assert_eq!(body["progress"]["status"], "completed");
    assert_eq!(body["progress"]["score"], 88);
    assert_eq!(body["progress"]["lesson"]["courseTitle"], "Ethics 101");
    assert!(body["statement"].is_null());
}

#[tokio::test]
async fn test_record_progress_with_statement() {
    let app = setup_app().await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/progress",
            json!({
                "learnerId": "u1",
                "lessonId": "l1",
                "xapiEvent": {
                    "id": "stmt-1",
                    "verb": { "id": "http://adlnet.gov/expapi/verbs/completed" },
                    "object": { "id": "l1" }
                }
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["progress"]["status"], "completed");
    assert_eq!(body["progress"]["xapiStatementId"], "stmt-1");
    assert_eq!(body["statement"]["statementId"], "stmt-1");

    let (status, body) = send(&app, test_request("GET", "/api/progress?learnerId=u1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"].as_array().unwrap().len(), 1);
    assert_eq!(body["statements"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_record_progress_requires_ids() {
    let app = setup_app().await;

    let (status, body) = send(
        &app,
        json_request("POST", "/api/progress", json!({ "lessonId": "l1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = send(&app, test_request("GET", "/api/progress", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_record_progress_rejects_malformed_json() {
    let app = setup_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/progress")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn test_query_progress_filters_by_lesson() {
    let app = setup_app().await;
    for lesson in ["l1", "l2"] {
        let (status, _) = send(
            &app,
            json_request("POST", "/api/progress", json!({ "learnerId": "u1", "lessonId": lesson })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = send(
        &app,
        test_request("GET", "/api/progress?learnerId=u1&lessonId=l2", None),
    )
    .await;
    let progress = body["progress"].as_array().unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0]["lessonId"], "l2");
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_login_returns_token_and_profile() {
    let app = setup_app().await;
    let ada = register(&app, "Ada", Role::Learner).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": "ADA@example.com", "password": "correct-horse" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], ada.id.as_str());
    assert_eq!(body["user"]["role"], "learner");
    assert_eq!(body["user"]["email"], "ada@example.com");

    // Signed JWT, not a guessable id prefix
    let token = body["token"].as_str().unwrap();
    assert_eq!(token.split('.').count(), 3);
    assert!(!token.contains(&ada.id));

    let (status, _) = send(&app, test_request("GET", "/api/dashboard/summary", Some(token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_failures() {
    let app = setup_app().await;
    register(&app, "Ada", Role::Learner).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": "ada@example.com", "password": "wrong-horse" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid credentials");

    let (status, _) = send(
        &app,
        json_request("POST", "/api/auth/login", json!({ "email": "ada@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = setup_app().await;

    let (status, _) = send(&app, test_request("GET", "/api/dashboard/summary", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, test_request("GET", "/api/admin/analytics", Some("bogus"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_forbid_learners() {
    let app = setup_app().await;
    register(&app, "Ada", Role::Learner).await;
    let token = login_token(&app, "ada@example.com").await;

    let (status, body) = send(&app, test_request("GET", "/api/admin/analytics", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = send(
        &app,
        test_request("DELETE", "/api/admin/learners/u1/records", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// =============================================================================
// Statements and dashboard
// =============================================================================

#[tokio::test]
async fn test_statement_feeds_dashboard() {
    let app = setup_app().await;
    app.catalog.put_course("c1", "Ethics 101").await.unwrap();
    register(&app, "Ada", Role::Learner).await;
    let token = login_token(&app, "ada@example.com").await;

    let (status, body) = send(
        &app,
        authed_json_request(
            "POST",
            "/api/xapi/statements",
            json!({ "verb": "completed", "courseId": "c1", "score": 92, "durationSeconds": 300 }),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["id"].is_string());
    assert!(body["createdAt"].is_string());

    let (status, body) = send(&app, test_request("GET", "/api/dashboard/summary", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);

    let dashboard = &body["dashboard"];
    assert_eq!(dashboard["learnerName"], "Ada");
    assert_eq!(dashboard["items"][0]["courseId"], "c1");
    assert_eq!(dashboard["items"][0]["status"], "completed");
    assert_eq!(dashboard["recentStatements"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_statement_requires_course() {
    let app = setup_app().await;
    register(&app, "Ada", Role::Learner).await;
    let token = login_token(&app, "ada@example.com").await;

    let (status, _) = send(
        &app,
        authed_json_request("POST", "/api/xapi/statements", json!({ "verb": "viewed" }), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Admin
// =============================================================================

#[tokio::test]
async fn test_admin_analytics_with_exports() {
    let app = setup_app().await;
    app.catalog.put_course("c1", "Ethics 101").await.unwrap();
    register(&app, "Ada", Role::Learner).await;
    register(&app, "Root", Role::Admin).await;

    let learner = login_token(&app, "ada@example.com").await;
    let admin = login_token(&app, "root@example.com").await;

    send(
        &app,
        authed_json_request(
            "POST",
            "/api/xapi/statements",
            json!({ "verb": "completed", "courseId": "c1", "score": 80 }),
            Some(&learner),
        ),
    )
    .await;

    let (status, body) = send(&app, test_request("GET", "/api/admin/analytics", Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);

    let analytics = &body["analytics"];
    assert_eq!(analytics["totalLearners"], 1);
    assert_eq!(analytics["totalStatements"], 1);
    assert_eq!(analytics["averageScore"], 80.0);
    assert_eq!(analytics["leaderboard"][0]["name"], "Ada");
    assert_eq!(analytics["courseBreakdown"][0]["title"], "Ethics 101");
    assert!(analytics["complianceExports"]["csv"]
        .as_str()
        .unwrap()
        .starts_with("data:text/csv;base64,"));

    let (_, body) = send(
        &app,
        test_request("GET", "/api/admin/analytics?courseId=c-other", Some(&admin)),
    )
    .await;
    assert_eq!(body["analytics"]["totalStatements"], 0);
}

#[tokio::test]
async fn test_admin_purges_learner_records() {
    let app = setup_app().await;
    register(&app, "Root", Role::Admin).await;
    let admin = login_token(&app, "root@example.com").await;

    send(
        &app,
        json_request("POST", "/api/progress", json!({ "learnerId": "u9", "lessonId": "l1" })),
    )
    .await;

    let (status, body) = send(
        &app,
        test_request("DELETE", "/api/admin/learners/u9/records", Some(&admin)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["learnerId"], "u9");
    assert_eq!(body["progressRemoved"], 1);

    let (_, body) = send(&app, test_request("GET", "/api/progress?learnerId=u9", None)).await;
    assert!(body["progress"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_purges_course_records() {
    let app = setup_app().await;
    app.catalog.put_course("c1", "Ethics 101").await.unwrap();
    app.catalog.put_lesson("l1", Some("c1"), "Gifts").await.unwrap();
    register(&app, "Root", Role::Admin).await;
    let admin = login_token(&app, "root@example.com").await;

    send(
        &app,
        json_request("POST", "/api/progress", json!({ "learnerId": "u1", "lessonId": "l1" })),
    )
    .await;

    let (status, body) = send(
        &app,
        test_request("DELETE", "/api/admin/courses/c1/records", Some(&admin)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["courseId"], "c1");
    assert_eq!(body["progressRemoved"], 1);
}
