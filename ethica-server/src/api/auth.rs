//! Bearer-token authentication
//!
//! `require_identity` resolves `Authorization: Bearer <token>` through the
//! identity provider and stores the [`Identity`] in request extensions;
//! `require_admin` additionally demands the admin role. Both reject before
//! the handler runs, so no rejected request ever mutates state.

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
    Json,
};
use ethica_common::identity::Identity;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: Identity,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(request) = payload?;

    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::BadRequest("email and password are required".to_string()));
    }

    let user = state
        .identity
        .authenticate(&request.email, &request.password)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    let token = state.identity.issue_token(&user).await?;
    info!(user_id = %user.id, role = %user.role, "User logged in");

    Ok(Json(LoginResponse { token, user }))
}

/// Any authenticated user
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = authenticate(&state, request.headers()).await?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Authenticated administrators only
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = authenticate(&state, request.headers()).await?;

    if !identity.is_admin() {
        debug!(user_id = %identity.id, path = %request.uri().path(), "Admin route refused");
        return Err(ApiError::Forbidden("Administrator role required".to_string()));
    }

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    state
        .identity
        .authorize(token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".to_string()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    Some(token.trim()).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&headers("Bearer abc.1.f00")), Some("abc.1.f00"));
        assert_eq!(bearer_token(&headers("bearer   tok ")), Some("tok"));
        assert_eq!(bearer_token(&headers("Basic dXNlcg==")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
