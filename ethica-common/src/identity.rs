//! Identity collaborator
//!
//! The tracking core only needs four things from identity: check a
//! credential, resolve a bearer token, and count or list learners for
//! analytics. [`IdentityProvider`] is that seam; [`SqliteIdentityStore`] is the
//! implementation shipped with the server.
//!
//! # Credentials
//!
//! Passwords are stored as Argon2id PHC strings, salt included. Tokens are
//! HS256 JWTs carrying the user id in `sub` plus `iat`/`exp`. The HMAC key is
//! 32 random bytes, base64 encoded in `settings.auth_jwt_secret` and created
//! on first start.

use crate::time;
use crate::{Error, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

const TOKEN_SECRET_KEY: &str = "auth_jwt_secret";
const TOKEN_SECRET_BYTES: usize = 32;
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Learner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Learner => "learner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "learner" => Ok(Role::Learner),
            other => Err(Error::Validation(format!("Unknown role '{}'", other))),
        }
    }
}

/// Learner or administrator profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `None` for an unknown email or a wrong password
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<Identity>>;

    /// `None` for a malformed, forged or expired token, or a deleted user
    async fn authorize(&self, token: &str) -> Result<Option<Identity>>;

    async fn issue_token(&self, identity: &Identity) -> Result<String>;

    async fn count_learners(&self) -> Result<i64>;

    /// Learner profiles ordered by id
    async fn list_learners(&self) -> Result<Vec<Identity>>;
}

/// Users table plus the signing secret from `settings`
#[derive(Clone)]
pub struct SqliteIdentityStore {
    pool: SqlitePool,
    secret: Vec<u8>,
    token_ttl: Duration,
}

/// Token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Issued at (Unix seconds)
    pub iat: u64,
    /// Expiry (Unix seconds)
    pub exp: u64,
}

impl SqliteIdentityStore {
    /// Load (or create) the signing secret and build the store
    pub async fn open(pool: SqlitePool, token_ttl_hours: i64) -> Result<Self> {
        let secret = load_token_secret(&pool).await?;

        Ok(Self {
            pool,
            secret,
            token_ttl: Duration::hours(token_ttl_hours.max(1)),
        })
    }

    /// Create a user
    ///
    /// Email is trimmed and lowercased; a duplicate email is a validation error.
    pub async fn register(&self, name: &str, email: &str, password: &str, role: Role) -> Result<Identity> {
        let name = name.trim();
        let email = email.trim().to_ascii_lowercase();

        if name.is_empty() {
            return Err(Error::Validation("name is required".to_string()));
        }
        if !email.contains('@') {
            return Err(Error::Validation("a valid email is required".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let existing: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(Error::Validation(format!("email '{}' is already registered", email)));
        }

        let identity = Identity {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email,
            role,
        };
        let password_hash = hash_password(password)?;

        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&identity.id)
        .bind(&identity.name)
        .bind(&identity.email)
        .bind(&password_hash)
        .bind(identity.role.as_str())
        .bind(time::to_db(&time::now()))
        .execute(&self.pool)
        .await?;

        info!(user_id = %identity.id, role = %identity.role, "Registered user");
        Ok(identity)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>> {
        let row = sqlx::query("SELECT id, name, email, role FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(identity_from_row).transpose()
    }

    /// Sign a token for `user_id` as if issued at `issued_at`
    pub fn sign_token(&self, user_id: &str, issued_at: DateTime<Utc>) -> Result<String> {
        let iat = issued_at.timestamp().max(0) as u64;
        let claims = Claims {
            sub: user_id.to_string(),
            iat,
            exp: iat.saturating_add(self.token_ttl.num_seconds().max(0) as u64),
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|e| Error::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Claims of a token with a valid signature and unexpired `exp`
    pub fn verify_token(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token.trim(), &DecodingKey::from_secret(&self.secret), &Validation::default()) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                match e.kind() {
                    ErrorKind::ExpiredSignature => debug!("Rejected expired token"),
                    ErrorKind::InvalidSignature => debug!("Rejected token with bad signature"),
                    _ => debug!(error = %e, "Rejected malformed token"),
                }
                None
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for SqliteIdentityStore {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<Identity>> {
        let row = sqlx::query("SELECT id, name, email, role, password_hash FROM users WHERE email = ?")
            .bind(email.trim().to_ascii_lowercase())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            debug!("Login attempt for unknown email");
            return Ok(None);
        };

        let stored_hash: String = row.try_get("password_hash")?;

        if !verify_password(password, &stored_hash)? {
            debug!("Login attempt with wrong password");
            return Ok(None);
        }

        identity_from_row(&row).map(Some)
    }

    async fn authorize(&self, token: &str) -> Result<Option<Identity>> {
        let Some(claims) = self.verify_token(token) else {
            return Ok(None);
        };

        self.find_by_id(&claims.sub).await
    }

    async fn issue_token(&self, identity: &Identity) -> Result<String> {
        self.sign_token(&identity.id, time::now())
    }

    async fn count_learners(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'learner'")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn list_learners(&self) -> Result<Vec<Identity>> {
        let rows = sqlx::query("SELECT id, name, email, role FROM users WHERE role = 'learner' ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(identity_from_row).collect()
    }
}

/// Load the signing key, generating it on first use
pub async fn load_token_secret(pool: &SqlitePool) -> Result<Vec<u8>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(TOKEN_SECRET_KEY)
        .fetch_optional(pool)
        .await?;

    match value {
        Some(value) => decode_secret(&value),
        None => initialize_token_secret(pool).await,
    }
}

async fn initialize_token_secret(pool: &SqlitePool) -> Result<Vec<u8>> {
    let mut secret = [0u8; TOKEN_SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut secret);

    // INSERT OR IGNORE + re-read: two processes starting together agree on one key
    sqlx::query("INSERT OR IGNORE INTO settings (key, value, updated_at) VALUES (?, ?, ?)")
        .bind(TOKEN_SECRET_KEY)
        .bind(BASE64.encode(secret))
        .bind(time::to_db(&time::now()))
        .execute(pool)
        .await?;

    let stored: String = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(TOKEN_SECRET_KEY)
        .fetch_one(pool)
        .await?;

    info!("Generated token signing key");
    decode_secret(&stored)
}

fn decode_secret(value: &str) -> Result<Vec<u8>> {
    let secret = BASE64
        .decode(value.trim())
        .map_err(|e| Error::Config(format!("Invalid {} setting: {}", TOKEN_SECRET_KEY, e)))?;
    if secret.len() < TOKEN_SECRET_BYTES {
        return Err(Error::Config(format!(
            "{} must hold at least {} bytes",
            TOKEN_SECRET_KEY, TOKEN_SECRET_BYTES
        )));
    }
    Ok(secret)
}

/// Argon2id PHC string with a fresh salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("Failed to hash password: {}", e)))
}

/// Check `password` against a stored PHC string
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| Error::Internal(format!("Invalid password hash format: {}", e)))?;

    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

fn identity_from_row(row: &SqliteRow) -> Result<Identity> {
    let role: String = row.try_get("role")?;

    Ok(Identity {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: role.parse()?,
    })
}
