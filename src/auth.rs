//! Accounts and bearer tokens.
//!
//! Passwords are stored as Argon2 PHC strings. Tokens are
//! `base64url(claims_json) "." base64url(hmac_sha256(claims_json))`,
//! signed with `[auth].secret`. There is no revocation list; logout is a
//! client-side session reset and tokens simply expire.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("an account with this email already exists")]
    DuplicateEmail,
    #[error("{0}")]
    Invalid(String),
    #[error("invalid token: {0}")]
    InvalidToken(&'static str),
    #[error("token expired")]
    Expired,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// A registered account, as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
}

/// Signed token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    pub email: String,
    /// Expiry, Unix seconds.
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn user(&self) -> User {
        User {
            id: self.sub,
            email: self.email.clone(),
        }
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is unreadable");
            false
        }
    }
}

/// Issues and checks bearer tokens.
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size")
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            exp: (Utc::now() + self.ttl).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let payload =
            serde_json::to_vec(&claims).map_err(|_| AuthError::InvalidToken("unencodable claims"))?;
        let mut mac = self.mac();
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or(AuthError::InvalidToken("malformed"))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::InvalidToken("malformed payload"))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthError::InvalidToken("malformed signature"))?;

        let mut mac = self.mac();
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken("bad signature"))?;

        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|_| AuthError::InvalidToken("unreadable claims"))?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::Invalid("a valid email is required".to_string()));
    }
    Ok(email)
}

/// Creates an account. The first account adopts bookmarks stored before
/// accounts existed.
pub async fn create_user(pool: &SqlitePool, email: &str, password: &str) -> Result<User, AuthError> {
    let email = normalize_email(email)?;
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::Invalid(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    let password_hash = hash_password(password)?;

    let mut tx = pool.begin().await?;
    let inserted = sqlx::query(
        "INSERT INTO users (email, password_hash, created_at) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(Utc::now().timestamp())
    .fetch_one(&mut *tx)
    .await;

    let id: i64 = match inserted {
        Ok(row) => row.get("id"),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            return Err(AuthError::DuplicateEmail)
        }
        Err(e) => return Err(e.into()),
    };

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *tx)
        .await?;
    if users == 1 {
        let adopted = sqlx::query("UPDATE bookmarks SET user_id = ? WHERE user_id IS NULL")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if adopted > 0 {
            tracing::info!(user_id = id, adopted, "first account adopted existing bookmarks");
        }
    }
    tx.commit().await?;

    tracing::info!(user_id = id, email = %email, "account created");
    Ok(User { id, email })
}

/// Checks credentials and returns the account.
pub async fn authenticate(pool: &SqlitePool, email: &str, password: &str) -> Result<User, AuthError> {
    let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
    let row = sqlx::query("SELECT id, password_hash FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Err(AuthError::InvalidCredentials);
    };
    let password_hash: String = row.get("password_hash");
    if !verify_password(password, &password_hash) {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(User {
        id: row.get("id"),
        email,
    })
}
