//! `/stats` — public platform-wide counters for the landing page.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;

use crate::{errors::AppResult, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(platform_stats))
}

async fn platform_stats(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;

    let total_subjects: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subjects")
        .fetch_one(pool).await?;
    let total_files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
        .fetch_one(pool).await?;
    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool).await?;
    let total_downloads: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(download_count), 0) FROM files")
            .fetch_one(pool).await?;

    Ok(Json(json!({
        "totalSubjects": total_subjects,
        "totalFiles": total_files,
        "totalUsers": total_users,
        "totalDownloads": total_downloads,
    })))
}
