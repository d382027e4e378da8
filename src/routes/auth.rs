//! `/auth` routes — registration, login and the current-user profile.
//!
//! Login deliberately returns the same message and status for an unknown
//! username and a wrong password, so the endpoint cannot be used to probe
//! which accounts exist.

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{hash_password, jwt, validate_password_strength, verify_password},
    errors::{AppError, AppResult},
    middleware::auth_guard::AuthUser,
    models::UserRole,
    state::AppState,
};

const INVALID_CREDENTIALS: &str = "Invalid username or password";

// ── Request / response types ──────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    username:  String,
    email:     String,
    password:  String,
    full_name: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    /// Username or email address.
    username: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    current_password: String,
    new_password:     String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserSummary {
    id:        i64,
    username:  String,
    email:     String,
    full_name: String,
    role:      String,
}

// ── Database row types (runtime queries — no DATABASE_URL at compile time) ──

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id:            i64,
    username:      String,
    email:         String,
    password_hash: String,
    full_name:     String,
    role:          String,
}

#[derive(sqlx::FromRow)]
struct MeRow {
    id:          i64,
    username:    String,
    email:       String,
    full_name:   String,
    role:        String,
    subject_id:  Option<i64>,
    path_id:     Option<i64>,
    scenario_id: Option<i64>,
    created_at:  chrono::NaiveDateTime,
}

// ── Routers ───────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login",    post(login))
        .route("/auth/logout",   post(logout))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/auth/me",           get(me))
        .route("/users/me/password", put(change_password))
}

// ── Handlers ──────────────────────────────────────────────────

fn validate_registration(body: &RegisterRequest) -> AppResult<()> {
    if body.username.trim().is_empty()
        || body.email.trim().is_empty()
        || body.password.is_empty()
        || body.full_name.trim().is_empty()
    {
        return Err(AppError::BadRequest("All fields are required".into()));
    }
    if !body.email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }
    validate_password_strength(&body.password)
}

/// POST /auth/register — create a new student account.
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let pool = &state.pool;

    validate_registration(&body)?;

    // Pre-check; the unique index still backs this up under a race and the
    // resulting driver error is translated to the same Duplicate response.
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ? OR email = ?)",
    )
    .bind(&body.username)
    .bind(&body.email)
    .fetch_one(pool)
    .await?;
    if taken {
        return Err(AppError::Duplicate("Username or email already exists".into()));
    }

    let hash = hash_password(&body.password)?;

    let result = sqlx::query(
        "INSERT INTO users (username, email, password_hash, role, full_name)
         VALUES (?, ?, ?, 'student', ?)",
    )
    .bind(&body.username)
    .bind(&body.email)
    .bind(hash)
    .bind(&body.full_name)
    .execute(pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Account created",
            "userId": result.last_insert_id(),
        })),
    ))
}

/// POST /auth/login — exchange credentials for a bearer token.
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;

    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::BadRequest("Username and password are required".into()));
    }

    let row: CredentialRow = sqlx::query_as::<_, CredentialRow>(
        "SELECT id, username, email, password_hash, full_name, role
         FROM users
         WHERE username = ? OR email = ?",
    )
    .bind(&body.username)
    .bind(&body.username)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::BadRequest(INVALID_CREDENTIALS.into()))?;

    verify_password(&body.password, &row.password_hash)
        .map_err(|_| AppError::BadRequest(INVALID_CREDENTIALS.into()))?;

    let role = UserRole::parse(&row.role)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Unknown role in users row: {}", row.role)))?;

    let claims = jwt::Claims::new(row.id, row.username.clone(), role);
    let token  = jwt::issue(&state.config.jwt_secret, &claims)?;

    Ok(Json(json!({
        "message": "Logged in",
        "token": token,
        "user": UserSummary {
            id:        row.id,
            username:  row.username,
            email:     row.email,
            full_name: row.full_name,
            role:      row.role,
        },
    })))
}

/// POST /auth/logout — tokens are stateless, so this is an acknowledgement
/// only; the client discards its copy.
async fn logout() -> Json<serde_json::Value> {
    Json(json!({ "message": "Logged out" }))
}

/// GET /auth/me — fresh profile read for the authenticated user.
async fn me(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
) -> AppResult<Json<serde_json::Value>> {
    let row: MeRow = sqlx::query_as::<_, MeRow>(
        "SELECT id, username, email, full_name, role, subject_id, path_id, scenario_id, created_at
         FROM users
         WHERE id = ?",
    )
    .bind(auth.user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound)?;

    Ok(Json(json!({
        "id": row.id,
        "username": row.username,
        "email": row.email,
        "fullName": row.full_name,
        "role": row.role,
        "subjectId": row.subject_id,
        "pathId": row.path_id,
        "scenarioId": row.scenario_id,
        "createdAt": row.created_at,
    })))
}

/// PUT /users/me/password — self-service password change; requires the
/// current password.
async fn change_password(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;

    validate_password_strength(&body.new_password)?;

    let current_hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
        .bind(auth.user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)?;

    verify_password(&body.current_password, &current_hash)
        .map_err(|_| AppError::BadRequest("Current password is incorrect".into()))?;

    let new_hash = hash_password(&body.new_password)?;
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(new_hash)
        .bind(auth.user_id)
        .execute(pool)
        .await?;

    Ok(Json(json!({ "message": "Password updated" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str, full_name: &str) -> RegisterRequest {
        RegisterRequest {
            username:  username.into(),
            email:     email.into(),
            password:  password.into(),
            full_name: full_name.into(),
        }
    }

    #[test]
    fn complete_registration_passes() {
        assert!(validate_registration(&request("sara", "sara@school.example", "secret1", "Sara K")).is_ok());
    }

    #[test]
    fn blank_fields_are_rejected() {
        assert!(validate_registration(&request("", "sara@school.example", "secret1", "Sara K")).is_err());
        assert!(validate_registration(&request("sara", "sara@school.example", "secret1", "  ")).is_err());
    }

    #[test]
    fn email_must_contain_at_sign() {
        assert!(validate_registration(&request("sara", "not-an-email", "secret1", "Sara K")).is_err());
    }

    #[test]
    fn weak_password_is_rejected() {
        assert!(validate_registration(&request("sara", "sara@school.example", "abc", "Sara K")).is_err());
    }
}
