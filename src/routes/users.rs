//! `/users` routes — administrative user management.
//! Every route here requires the admin capability (route-layer guard).

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{hash_password, validate_password_strength},
    errors::{AppError, AppResult},
    middleware::{auth_guard::AuthUser, role_guard::require_admin},
    models::UserRole,
    state::AppState,
};

pub fn admin_router() -> Router<AppState> {
    use axum::middleware;
    use axum::routing::put;
    let admin_guard = middleware::from_fn(require_admin);
    Router::new()
        .route("/users",                get(list_users).post(create_user))
        .route("/users/{id}",           get(get_user).put(update_user).delete(delete_user))
        .route("/users/{id}/password",  put(set_password))
        .route("/users/stats/overview", get(user_stats))
        .route_layer(admin_guard)
}

// ── Row types ────────────────────────────────────────────────

#[derive(sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserRow {
    id:         i64,
    username:   String,
    email:      String,
    full_name:  String,
    role:       String,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
}

#[derive(sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDetailRow {
    id:             i64,
    username:       String,
    email:          String,
    full_name:      String,
    role:           String,
    uploaded_files: i64,
    created_at:     chrono::NaiveDateTime,
    updated_at:     chrono::NaiveDateTime,
}

#[derive(sqlx::FromRow, Serialize)]
struct RoleCountRow {
    role:  String,
    count: i64,
}

#[derive(sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploaderRow {
    username:     String,
    full_name:    String,
    upload_count: i64,
}

// ── Request bodies / queries ─────────────────────────────────

#[derive(Deserialize)]
struct ListQuery {
    search: Option<String>,
    role:   Option<String>,
    page:   Option<u32>,
    limit:  Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserBody {
    username:  String,
    email:     String,
    password:  String,
    full_name: String,
    role:      Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUserBody {
    username:  String,
    email:     String,
    full_name: String,
    role:      String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetPasswordBody {
    new_password: String,
}

// ── Handlers ─────────────────────────────────────────────────

/// Paginated user list with optional search and role filters.
async fn list_users(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;
    let (page, limit, offset) = super::page_window(q.page, q.limit);

    if let Some(ref role) = q.role {
        if UserRole::parse(role).is_none() {
            return Err(AppError::BadRequest("Invalid role filter".into()));
        }
    }

    let mut sql = String::from(
        "SELECT id, username, email, full_name, role, created_at, updated_at
         FROM users WHERE 1=1",
    );
    let mut count_sql = String::from("SELECT COUNT(*) FROM users WHERE 1=1");

    if q.search.is_some() {
        sql.push_str(" AND (username LIKE ? OR email LIKE ? OR full_name LIKE ?)");
        count_sql.push_str(" AND (username LIKE ? OR email LIKE ? OR full_name LIKE ?)");
    }
    if q.role.is_some() {
        sql.push_str(" AND role = ?");
        count_sql.push_str(" AND role = ?");
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

    let search_pattern = q.search.as_ref().map(|s| format!("%{s}%"));

    let mut query = sqlx::query_as::<_, UserRow>(&sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(ref pattern) = search_pattern {
        query = query.bind(pattern).bind(pattern).bind(pattern);
        count_query = count_query.bind(pattern).bind(pattern).bind(pattern);
    }
    if let Some(ref role) = q.role {
        query = query.bind(role);
        count_query = count_query.bind(role);
    }

    let rows: Vec<UserRow> = query.bind(limit).bind(offset).fetch_all(pool).await?;
    let total: i64 = count_query.fetch_one(pool).await?;
    let total_pages = (total as u64).div_ceil(limit as u64);

    Ok(Json(json!({
        "users": rows,
        "pagination": {
            "currentPage": page,
            "totalPages": total_pages,
            "totalUsers": total,
            "hasNext": (page as u64) < total_pages,
            "hasPrev": page > 1,
        },
    })))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<UserDetailRow>> {
    let row: UserDetailRow = sqlx::query_as::<_, UserDetailRow>(
        "SELECT u.id, u.username, u.email, u.full_name, u.role,
                COUNT(f.id) AS uploaded_files, u.created_at, u.updated_at
         FROM users u
         LEFT JOIN files f ON u.id = f.uploaded_by
         WHERE u.id = ?
         GROUP BY u.id",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound)?;
    Ok(Json(row))
}

async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserBody>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let pool = &state.pool;

    if body.username.trim().is_empty()
        || body.email.trim().is_empty()
        || body.password.is_empty()
        || body.full_name.trim().is_empty()
    {
        return Err(AppError::BadRequest("All fields are required".into()));
    }
    validate_password_strength(&body.password)?;

    let role = body.role.as_deref().unwrap_or("student");
    if UserRole::parse(role).is_none() {
        return Err(AppError::BadRequest("Invalid role".into()));
    }

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
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&body.username)
    .bind(&body.email)
    .bind(hash)
    .bind(role)
    .bind(&body.full_name)
    .execute(pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User created",
            "userId": result.last_insert_id(),
        })),
    ))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserBody>,
) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;

    if body.username.trim().is_empty()
        || body.email.trim().is_empty()
        || body.full_name.trim().is_empty()
    {
        return Err(AppError::BadRequest("All fields are required".into()));
    }
    if UserRole::parse(&body.role).is_none() {
        return Err(AppError::BadRequest("Invalid role".into()));
    }

    // Uniqueness check against other rows only.
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM users WHERE (username = ? OR email = ?) AND id != ?)",
    )
    .bind(&body.username)
    .bind(&body.email)
    .bind(id)
    .fetch_one(pool)
    .await?;
    if taken {
        return Err(AppError::Duplicate("Username or email already exists".into()));
    }

    let affected = sqlx::query(
        "UPDATE users SET username = ?, email = ?, full_name = ?, role = ? WHERE id = ?",
    )
    .bind(&body.username)
    .bind(&body.email)
    .bind(&body.full_name)
    .bind(&body.role)
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "message": "User updated" })))
}

/// Admin password reset for another account; the self-service flow with the
/// current-password check lives in the auth router.
async fn set_password(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SetPasswordBody>,
) -> AppResult<Json<serde_json::Value>> {
    validate_password_strength(&body.new_password)?;

    let hash = hash_password(&body.new_password)?;
    let affected = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(hash)
        .bind(id)
        .execute(&state.pool)
        .await?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "message": "Password updated" })))
}

/// Decides whether a user row may be deleted. Self-deletion is always
/// rejected, even for admins and even when the account owns nothing; an
/// account that still owns uploaded files is rejected with the count.
fn check_user_deletable(acting_id: i64, target_id: i64, owned_files: i64) -> AppResult<()> {
    if target_id == acting_id {
        return Err(AppError::BadRequest("Cannot delete your own account".into()));
    }
    if owned_files > 0 {
        return Err(AppError::BadRequest(format!(
            "Cannot delete user: they uploaded {owned_files} file(s). Delete or reassign the files first."
        )));
    }
    Ok(())
}

/// Delete a user. Rejected for self-deletion and while the user still owns
/// uploaded files (count included in the message).
async fn delete_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;

    let file_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE uploaded_by = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    check_user_deletable(admin.user_id, id, file_count)?;

    let affected = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    if affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "message": "User deleted" })))
}

/// Aggregate user statistics for the admin dashboard.
async fn user_stats(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;

    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool).await?;

    let users_by_role: Vec<RoleCountRow> = sqlx::query_as::<_, RoleCountRow>(
        "SELECT role, COUNT(*) AS count FROM users GROUP BY role",
    )
    .fetch_all(pool)
    .await?;

    let recent_users: Vec<UserRow> = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, email, full_name, role, created_at, updated_at
         FROM users
         ORDER BY created_at DESC
         LIMIT 5",
    )
    .fetch_all(pool)
    .await?;

    let active_uploaders: Vec<UploaderRow> = sqlx::query_as::<_, UploaderRow>(
        "SELECT u.username, u.full_name, COUNT(f.id) AS upload_count
         FROM users u
         JOIN files f ON u.id = f.uploaded_by
         GROUP BY u.id, u.username, u.full_name
         ORDER BY upload_count DESC
         LIMIT 5",
    )
    .fetch_all(pool)
    .await?;

    Ok(Json(json!({
        "totalUsers": total_users,
        "usersByRole": users_by_role,
        "recentUsers": recent_users,
        "activeUploaders": active_uploaders,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_deletion_is_rejected_even_without_files() {
        assert!(check_user_deletable(7, 7, 0).is_err());
    }

    #[test]
    fn file_owner_cannot_be_deleted() {
        let err = check_user_deletable(1, 2, 3).unwrap_err();
        match err {
            AppError::BadRequest(msg) => assert!(msg.contains("3 file(s)")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn other_user_without_files_is_deletable() {
        assert!(check_user_deletable(1, 2, 0).is_ok());
    }
}
