//! `/paths` routes — curriculum tracks and the user path/scenario assignment.
//!
//! A user's `(path_id, scenario_id)` pair is only ever written together, and
//! only after verifying the scenario actually belongs to the path, so the two
//! columns can never drift apart.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    errors::{AppError, AppResult},
    middleware::{auth_guard::AuthUser, role_guard::require_admin},
    models::Capability,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/paths",      get(list_paths))
        .route("/paths/{id}", get(get_path))
}

pub fn protected_router() -> Router<AppState> {
    use axum::middleware;
    use axum::routing::{post, put};
    let admin_guard = middleware::from_fn(require_admin);
    Router::new()
        .route("/users/{id}/path", put(assign_user_path))
        .merge(
            Router::new()
                .route("/paths",                post(create_path))
                .route("/paths/{id}",           put(update_path).delete(delete_path))
                .route("/paths/stats/overview", get(path_stats))
                .route_layer(admin_guard),
        )
}

// ── Row types ────────────────────────────────────────────────

#[derive(sqlx::FromRow, Serialize)]
struct PathRow {
    id:          i64,
    name:        String,
    name_ar:     String,
    description: Option<String>,
}

#[derive(sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
struct PathUsageRow {
    name_ar:    String,
    user_count: i64,
}

// ── Request bodies ───────────────────────────────────────────

#[derive(Deserialize)]
struct PathBody {
    name:        String,
    name_ar:     String,
    description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignPathBody {
    path_id:     i64,
    scenario_id: i64,
}

// ── Handlers ─────────────────────────────────────────────────

async fn list_paths(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let rows: Vec<PathRow> = sqlx::query_as::<_, PathRow>(
        "SELECT id, name, name_ar, description FROM paths ORDER BY id",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn get_path(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let row: PathRow = sqlx::query_as::<_, PathRow>(
        "SELECT id, name, name_ar, description FROM paths WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound)?;
    Ok(Json(json!({ "data": row })))
}

/// Users may assign their own path; admins may assign anyone's.
fn may_assign(auth: &AuthUser, target_user_id: i64) -> bool {
    auth.user_id == target_user_id || auth.role.can(Capability::Administer)
}

/// Composite validity check: the scenario must exist AND belong to the
/// requested path. `scenario_path` is the scenario's stored `path_id`, or
/// `None` when the scenario row does not exist.
fn check_pair_consistent(scenario_path: Option<i64>, path_id: i64) -> AppResult<()> {
    if scenario_path != Some(path_id) {
        return Err(AppError::BadRequest(
            "Scenario does not belong to the selected path".into(),
        ));
    }
    Ok(())
}

/// PUT /users/{id}/path — assign a curriculum path and scenario to a user.
/// Users may update themselves; admins may update anyone.
async fn assign_user_path(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<i64>,
    Json(body): Json<AssignPathBody>,
) -> AppResult<Json<serde_json::Value>> {
    if !may_assign(&auth, user_id) {
        return Err(AppError::Forbidden);
    }

    let pool = &state.pool;

    let scenario_path: Option<i64> =
        sqlx::query_scalar("SELECT path_id FROM scenarios WHERE id = ?")
            .bind(body.scenario_id)
            .fetch_optional(pool)
            .await?;
    check_pair_consistent(scenario_path, body.path_id)?;

    // Both columns in one statement — never a half-assigned user.
    let affected = sqlx::query("UPDATE users SET path_id = ?, scenario_id = ? WHERE id = ?")
        .bind(body.path_id)
        .bind(body.scenario_id)
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound);
    }

    Ok(Json(json!({
        "message": "Path updated",
        "pathId": body.path_id,
        "scenarioId": body.scenario_id,
    })))
}

async fn create_path(
    State(state): State<AppState>,
    Json(body): Json<PathBody>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    if body.name.trim().is_empty() || body.name_ar.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Path name is required in both languages".into(),
        ));
    }

    let result = sqlx::query("INSERT INTO paths (name, name_ar, description) VALUES (?, ?, ?)")
        .bind(&body.name)
        .bind(&body.name_ar)
        .bind(body.description.as_deref().unwrap_or(""))
        .execute(&state.pool)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Path created",
            "pathId": result.last_insert_id(),
        })),
    ))
}

async fn update_path(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<PathBody>,
) -> AppResult<Json<serde_json::Value>> {
    if body.name.trim().is_empty() || body.name_ar.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Path name is required in both languages".into(),
        ));
    }

    let affected = sqlx::query("UPDATE paths SET name = ?, name_ar = ?, description = ? WHERE id = ?")
        .bind(&body.name)
        .bind(&body.name_ar)
        .bind(body.description.as_deref().unwrap_or(""))
        .bind(id)
        .execute(&state.pool)
        .await?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "message": "Path updated" })))
}

/// Delete a path. Rejected while any user references it.
async fn delete_path(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE path_id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    if user_count > 0 {
        return Err(AppError::BadRequest(
            "Cannot delete path: users are still assigned to it".into(),
        ));
    }

    let affected = sqlx::query("DELETE FROM paths WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    if affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "message": "Path deleted" })))
}

/// Path/scenario usage counts for the admin dashboard.
async fn path_stats(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;

    let total_paths: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM paths")
        .fetch_one(pool).await?;
    let total_scenarios: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scenarios")
        .fetch_one(pool).await?;

    let users_by_path: Vec<PathUsageRow> = sqlx::query_as::<_, PathUsageRow>(
        "SELECT p.name_ar, COUNT(u.id) AS user_count
         FROM paths p
         LEFT JOIN users u ON p.id = u.path_id
         GROUP BY p.id, p.name_ar",
    )
    .fetch_all(pool)
    .await?;

    let users_by_scenario: Vec<PathUsageRow> = sqlx::query_as::<_, PathUsageRow>(
        "SELECT s.name_ar, COUNT(u.id) AS user_count
         FROM scenarios s
         LEFT JOIN users u ON s.id = u.scenario_id
         GROUP BY s.id, s.name_ar",
    )
    .fetch_all(pool)
    .await?;

    Ok(Json(json!({
        "totalPaths": total_paths,
        "totalScenarios": total_scenarios,
        "usersByPath": users_by_path,
        "usersByScenario": users_by_scenario,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn auth(user_id: i64, role: UserRole) -> AuthUser {
        AuthUser { user_id, username: "someone".into(), role }
    }

    #[test]
    fn users_assign_only_themselves() {
        assert!(may_assign(&auth(5, UserRole::Student), 5));
        assert!(!may_assign(&auth(5, UserRole::Student), 6));
        assert!(!may_assign(&auth(5, UserRole::Teacher), 6));
    }

    #[test]
    fn admins_assign_anyone() {
        assert!(may_assign(&auth(1, UserRole::Admin), 99));
    }

    #[test]
    fn scenario_from_another_path_is_rejected() {
        assert!(check_pair_consistent(Some(2), 1).is_err());
    }

    #[test]
    fn missing_scenario_is_rejected() {
        assert!(check_pair_consistent(None, 1).is_err());
    }

    #[test]
    fn matching_pair_is_accepted() {
        assert!(check_pair_consistent(Some(3), 3).is_ok());
    }
}
