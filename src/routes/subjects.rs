//! `/subjects` routes — subject catalogue with per-subject file counts.
//! Reads are public; mutations and stats require the admin capability.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    errors::{AppError, AppResult},
    middleware::role_guard::require_admin,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subjects",      get(list_subjects))
        .route("/subjects/{id}", get(get_subject))
}

pub fn admin_router() -> Router<AppState> {
    use axum::middleware;
    use axum::routing::post;
    let admin_guard = middleware::from_fn(require_admin);
    Router::new()
        .route("/subjects",                post(create_subject))
        .route("/subjects/{id}",           axum::routing::put(update_subject).delete(delete_subject))
        .route("/subjects/stats/overview", get(subject_stats))
        .route_layer(admin_guard)
}

// ── Row types ────────────────────────────────────────────────

#[derive(sqlx::FromRow, Serialize)]
struct SubjectRow {
    id:          i64,
    name:        String,
    name_ar:     String,
    description: Option<String>,
    color:       String,
    icon:        String,
    file_count:  i64,
    created_at:  chrono::NaiveDateTime,
}

#[derive(sqlx::FromRow, Serialize)]
struct SubjectStatsRow {
    id:              i64,
    name_ar:         String,
    color:           String,
    file_count:      i64,
    total_size:      i64,
    total_downloads: i64,
}

// ── Request bodies ───────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubjectBody {
    name:        String,
    name_ar:     String,
    description: Option<String>,
    color:       Option<String>,
    icon:        Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────

/// List all subjects with their file counts.
async fn list_subjects(State(state): State<AppState>) -> AppResult<Json<Vec<SubjectRow>>> {
    let rows: Vec<SubjectRow> = sqlx::query_as::<_, SubjectRow>(
        "SELECT s.id, s.name, s.name_ar, s.description, s.color, s.icon,
                COUNT(f.id) AS file_count, s.created_at
         FROM subjects s
         LEFT JOIN files f ON s.id = f.subject_id
         GROUP BY s.id
         ORDER BY s.name_ar",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

async fn get_subject(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<SubjectRow>> {
    let row: SubjectRow = sqlx::query_as::<_, SubjectRow>(
        "SELECT s.id, s.name, s.name_ar, s.description, s.color, s.icon,
                COUNT(f.id) AS file_count, s.created_at
         FROM subjects s
         LEFT JOIN files f ON s.id = f.subject_id
         WHERE s.id = ?
         GROUP BY s.id",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound)?;
    Ok(Json(row))
}

async fn create_subject(
    State(state): State<AppState>,
    Json(body): Json<SubjectBody>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let pool = &state.pool;
    validate_names(&body)?;

    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM subjects WHERE name = ? OR name_ar = ?)",
    )
    .bind(&body.name)
    .bind(&body.name_ar)
    .fetch_one(pool)
    .await?;
    if taken {
        return Err(AppError::Duplicate("Subject name already exists".into()));
    }

    let result = sqlx::query(
        "INSERT INTO subjects (name, name_ar, description, color, icon)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&body.name)
    .bind(&body.name_ar)
    .bind(body.description.as_deref().unwrap_or(""))
    .bind(body.color.as_deref().unwrap_or("#007bff"))
    .bind(body.icon.as_deref().unwrap_or("book"))
    .execute(pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Subject created",
            "subjectId": result.last_insert_id(),
        })),
    ))
}

async fn update_subject(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SubjectBody>,
) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;
    validate_names(&body)?;

    // Uniqueness check against other rows only.
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM subjects WHERE (name = ? OR name_ar = ?) AND id != ?)",
    )
    .bind(&body.name)
    .bind(&body.name_ar)
    .bind(id)
    .fetch_one(pool)
    .await?;
    if taken {
        return Err(AppError::Duplicate("Subject name already exists".into()));
    }

    let affected = sqlx::query(
        "UPDATE subjects SET name = ?, name_ar = ?, description = ?, color = ?, icon = ?
         WHERE id = ?",
    )
    .bind(&body.name)
    .bind(&body.name_ar)
    .bind(body.description.as_deref().unwrap_or(""))
    .bind(body.color.as_deref().unwrap_or("#007bff"))
    .bind(body.icon.as_deref().unwrap_or("book"))
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "message": "Subject updated" })))
}

/// Delete a subject. Rejected while any file references it, with the count in
/// the error message.
async fn delete_subject(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;

    let file_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE subject_id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    if file_count > 0 {
        return Err(AppError::BadRequest(format!(
            "Cannot delete subject: it still has {file_count} file(s). Delete them first."
        )));
    }

    let affected = sqlx::query("DELETE FROM subjects WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    if affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "message": "Subject deleted" })))
}

/// Per-subject totals for the admin dashboard.
async fn subject_stats(State(state): State<AppState>) -> AppResult<Json<Vec<SubjectStatsRow>>> {
    let rows: Vec<SubjectStatsRow> = sqlx::query_as::<_, SubjectStatsRow>(
        "SELECT s.id, s.name_ar, s.color,
                COUNT(f.id) AS file_count,
                COALESCE(SUM(f.file_size), 0) AS total_size,
                COALESCE(SUM(f.download_count), 0) AS total_downloads
         FROM subjects s
         LEFT JOIN files f ON s.id = f.subject_id
         GROUP BY s.id, s.name_ar, s.color
         ORDER BY file_count DESC",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

fn validate_names(body: &SubjectBody) -> AppResult<()> {
    if body.name.trim().is_empty() || body.name_ar.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Subject name is required in both languages".into(),
        ));
    }
    Ok(())
}
