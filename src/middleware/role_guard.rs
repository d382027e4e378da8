//! Role-based authorization guard. Checks go through the capability matrix on
//! `UserRole` so the permission table lives in a single place.

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};

use crate::errors::AppError;
use crate::middleware::auth_guard::AuthUser;
use crate::models::Capability;

/// Middleware: require the administrative capability.
pub async fn require_admin(
    Extension(user): Extension<AuthUser>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !user.role.can(Capability::Administer) {
        return Err(AppError::Forbidden);
    }
    Ok(next.run(req).await)
}
