//! REST backend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/auth/register` | Create an account |
//! | `POST` | `/api/auth/login` | Exchange credentials for a bearer token |
//! | `GET`  | `/api/auth/verify` | Check a bearer token |
//! | `GET`  | `/api/bookmarks` | List (`limit`, `all`), search (`search`), group (`grouped`) |
//! | `POST` | `/api/bookmarks` | Add a bookmark or note |
//! | `PUT`  | `/api/bookmarks/{id}` | Replace url/notes/tags |
//! | `DELETE` | `/api/bookmarks/{id}` | Hard delete |
//!
//! Every `/api/bookmarks` route requires `Authorization: Bearer <token>`
//! and only sees the token owner's records.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "either a URL or notes is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `conflict` (409), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser extension
//! and web clients can call the API directly.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use stash_core::models::{BookmarkDraft, BookmarkRecord};
use stash_core::pagination::group_by_domain;
use stash_core::store::{RecordStore, StoreError, TitleResolver};

use crate::auth::{self, AuthError, Claims, TokenSigner, User};
use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pool: SqlitePool,
    signer: TokenSigner,
    titles: Arc<dyn TitleResolver>,
}

impl AppState {
    pub fn new(pool: SqlitePool, signer: TokenSigner, titles: Arc<dyn TitleResolver>) -> Self {
        Self {
            pool,
            signer,
            titles,
        }
    }

    fn store_for(&self, claims: &Claims) -> SqliteStore {
        SqliteStore::new(self.pool.clone(), self.titles.clone(), claims.sub)
    }
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs migrations first, so a fresh database works without `stash init`.
/// Returns when the server shuts down, or an error if binding fails.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let secret = config.auth.require_secret()?;
    let pool = crate::db::connect(config).await?;
    crate::migrate::migrate_pool(&pool).await?;

    let state = AppState::new(
        pool,
        TokenSigner::new(secret, config.auth.token_ttl_hours),
        crate::title::resolver_for(&config.server)?,
    );

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, fetch_titles = config.server.fetch_titles, "server started");
    println!("Stash server listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/auth/register", post(handle_register))
        .route("/api/auth/login", post(handle_login))
        .route("/api/auth/verify", get(handle_verify))
        .route("/api/bookmarks", get(handle_list).post(handle_create))
        .route(
            "/api/bookmarks/{id}",
            put(handle_update).delete(handle_delete),
        )
        .fallback(handle_fallback)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn unauthorized(message: impl Into<String>) -> AppError {
    app_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

fn conflict(message: impl Into<String>) -> AppError {
    app_error(StatusCode::CONFLICT, "conflict", message)
}

fn internal(message: impl Into<String>) -> AppError {
    app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unauthorized(m) => unauthorized(m),
            StoreError::NotFound(_) => not_found("Bookmark not found"),
            StoreError::Validation(m) => bad_request(m),
            StoreError::Transient(m) => {
                tracing::error!(error = %m, "store failure");
                internal("storage unavailable")
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidToken(_) | AuthError::Expired => {
                unauthorized(message)
            }
            AuthError::DuplicateEmail => conflict(message),
            AuthError::Invalid(_) => bad_request(message),
            AuthError::Hash(_) | AuthError::Database(_) => {
                tracing::error!(error = %message, "auth failure");
                internal("authentication backend failed")
            }
        }
    }
}

/// Verifies the bearer token on a request.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<Claims, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| unauthorized("No token provided"))?;
    Ok(state.signer.verify(token)?)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_fallback() -> AppError {
    not_found("API endpoint not found")
}

// ============ Auth ============

#[derive(Deserialize)]
struct CredentialsBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

impl CredentialsBody {
    fn require(&self) -> Result<(), AppError> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(bad_request("Email and password are required"));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct UserResponse {
    user: User,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: User,
}

#[derive(Serialize)]
struct VerifyResponse {
    authenticated: bool,
    user: User,
}

async fn handle_register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsBody>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    body.require()?;
    let user = auth::create_user(&state.pool, &body.email, &body.password).await?;
    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

async fn handle_login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsBody>,
) -> Result<Json<LoginResponse>, AppError> {
    body.require()?;
    let user = auth::authenticate(&state.pool, &body.email, &body.password).await?;
    let token = state.signer.issue(&user)?;
    tracing::info!(user_id = user.id, "login");
    Ok(Json(LoginResponse { token, user }))
}

async fn handle_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<VerifyResponse>, AppError> {
    let claims = authorize(&state, &headers)?;
    Ok(Json(VerifyResponse {
        authenticated: true,
        user: claims.user(),
    }))
}

// ============ Bookmarks ============

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    limit: Option<usize>,
    #[serde(default)]
    all: bool,
    search: Option<String>,
    #[serde(default)]
    grouped: bool,
}

#[derive(Serialize)]
struct ListResponse {
    bookmarks: Vec<BookmarkRecord>,
}

#[derive(Deserialize)]
struct DraftBody {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    tags: String,
}

impl DraftBody {
    fn into_draft(self) -> BookmarkDraft {
        BookmarkDraft::new(self.url.as_deref(), &self.notes, &self.tags)
    }
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    message: String,
}

async fn handle_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Response, AppError> {
    let claims = authorize(&state, &headers)?;
    let store = state.store_for(&claims);

    let records = match params.search.as_deref().map(str::trim) {
        Some(term) if !term.is_empty() => store.search_substring(term).await?,
        _ if params.all => store.list_all().await?,
        _ => store.list_newest_first(params.limit).await?,
    };

    if params.grouped {
        let groups: BTreeMap<String, Vec<BookmarkRecord>> = group_by_domain(&records);
        return Ok(Json(groups).into_response());
    }
    Ok(Json(ListResponse { bookmarks: records }).into_response())
}

async fn handle_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DraftBody>,
) -> Result<Json<BookmarkRecord>, AppError> {
    let claims = authorize(&state, &headers)?;
    let draft = body.into_draft();
    draft.validate()?;
    let record = state.store_for(&claims).insert(&draft).await?;
    Ok(Json(record))
}

async fn handle_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<DraftBody>,
) -> Result<Json<BookmarkRecord>, AppError> {
    let claims = authorize(&state, &headers)?;
    let draft = body.into_draft();
    draft.validate()?;
    let record = state.store_for(&claims).update(id, &draft).await?;
    Ok(Json(record))
}

async fn handle_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, AppError> {
    let claims = authorize(&state, &headers)?;
    if !state.store_for(&claims).delete(id).await? {
        return Err(not_found("Bookmark not found"));
    }
    Ok(Json(DeleteResponse {
        success: true,
        message: "Bookmark deleted successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_status_codes() {
        let cases = [
            (StoreError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (StoreError::NotFound(1), StatusCode::NOT_FOUND),
            (StoreError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (StoreError::Transient("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn auth_errors_map_to_status_codes() {
        assert_eq!(AppError::from(AuthError::DuplicateEmail).code, "conflict");
        assert_eq!(AppError::from(AuthError::Expired).code, "unauthorized");
        assert_eq!(
            AppError::from(AuthError::Invalid("bad".into())).status,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn missing_bearer_is_unauthorized() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let state = AppState::new(
            pool,
            TokenSigner::new("0123456789abcdef-test", 1),
            Arc::new(stash_core::store::UrlAsTitle),
        );
        let mut headers = HeaderMap::new();
        assert_eq!(
            authorize(&state, &headers).unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );
        headers.insert(header::AUTHORIZATION, "Bearer nope".parse().unwrap());
        assert_eq!(
            authorize(&state, &headers).unwrap_err().code,
            "unauthorized"
        );
    }
}
