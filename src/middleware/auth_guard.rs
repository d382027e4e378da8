//! Authentication guard middleware.
//!
//! Reads the `Authorization: Bearer` header, verifies the JWT, and injects an
//! `AuthUser` extension into the request for downstream handlers. No session
//! state is kept server-side; each request is authorized from the token's
//! embedded claims alone.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::{
    auth::jwt,
    errors::AppError,
    models::UserRole,
    state::AppState,
};

/// Authenticated user extracted from a valid bearer token. Injected into
/// request extensions by `require_auth`; downstream handlers use
/// `Extension<AuthUser>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id:  i64,
    #[allow(dead_code)]
    pub username: String,
    pub role:     UserRole,
}

/// Middleware: require a valid bearer token.
/// On success, inserts `AuthUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let claims = jwt::verify(&state.config.jwt_secret, token)?;

    req.extensions_mut().insert(AuthUser {
        user_id:  claims.sub,
        username: claims.username,
        role:     claims.role,
    });

    Ok(next.run(req).await)
}
