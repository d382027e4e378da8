//! `/files` routes — study file metadata CRUD, multipart upload and download.
//!
//! Uploads are allowed for admins anywhere and for teachers on their own
//! assigned subject only; metadata edits and deletes stay admin-only.
//! Downloads are public and bump the per-file counter exactly once per
//! successful response.

use axum::{
    extract::{DefaultBodyLimit, Extension, Multipart, Path, Query, State},
    http::{header, StatusCode},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult},
    middleware::auth_guard::AuthUser,
    models::Capability,
    state::AppState,
};

/// MIME types accepted for upload.
const ALLOWED_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "video/mp4",
    "video/avi",
    "video/quicktime",
    "text/plain",
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/files",               get(list_files))
        .route("/files/{id}",          get(get_file))
        .route("/files/download/{id}", get(download_file))
}

pub fn protected_router(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/files/upload",
            axum::routing::post(upload_file)
                // Multipart bodies carry the blob plus form fields; leave
                // headroom above the per-file ceiling checked in the handler.
                .layer(DefaultBodyLimit::max(upload_limit + 1024 * 1024)),
        )
        .route("/files/{id}", axum::routing::put(update_file).delete(delete_file))
        .route("/files/stats/overview", get(file_stats))
        .route("/files/stats/teacher/{subject_id}", get(teacher_stats))
}

// ── Row / query types ────────────────────────────────────────

#[derive(sqlx::FromRow, Serialize)]
struct FileRow {
    id:             i64,
    title:          String,
    description:    Option<String>,
    filename:       String,
    original_name:  String,
    file_type:      String,
    file_size:      i64,
    subject_id:     i64,
    subject_name:   String,
    subject_color:  String,
    uploaded_by:    i64,
    uploader_name:  String,
    download_count: i64,
    created_at:     chrono::NaiveDateTime,
}

#[derive(sqlx::FromRow)]
struct BlobRow {
    filename:      String,
    original_name: String,
    file_type:     String,
}

#[derive(Deserialize)]
struct ListQuery {
    subject_id: Option<i64>,
    search:     Option<String>,
    file_type:  Option<String>,
    page:       Option<u32>,
    limit:      Option<u32>,
}

#[derive(Deserialize)]
struct UpdateFileBody {
    title:       String,
    description: Option<String>,
    subject_id:  i64,
}

// ── Upload validation helpers ────────────────────────────────

fn validate_upload(mime: &str, size: usize, limit: usize) -> AppResult<()> {
    if !ALLOWED_TYPES.contains(&mime) {
        return Err(AppError::UnsupportedType);
    }
    if size > limit {
        return Err(AppError::TooLarge);
    }
    Ok(())
}

/// `Content-Disposition` value carrying the original name back to the
/// caller, with quote and newline characters neutralized.
fn content_disposition(original_name: &str) -> String {
    format!(
        "attachment; filename=\"{}\"",
        original_name.replace(['"', '\r', '\n'], "_")
    )
}

/// Collision-resistant stored name: fresh UUID plus the original extension.
/// The human-readable name lives only in the database row.
fn stored_filename(original: &str) -> String {
    let ext = PathBuf::from(original)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin")
        .to_lowercase();
    format!("{}.{}", Uuid::new_v4(), ext)
}

// ── Handlers ─────────────────────────────────────────────────

/// List files with optional subject/search/type filters and pagination.
async fn list_files(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;
    let (page, limit, offset) = super::page_window(q.page, q.limit);

    let mut sql = String::from(
        "SELECT f.id, f.title, f.description, f.filename, f.original_name,
                f.file_type, f.file_size, f.subject_id,
                s.name_ar AS subject_name, s.color AS subject_color,
                f.uploaded_by, u.full_name AS uploader_name,
                f.download_count, f.created_at
         FROM files f
         JOIN subjects s ON f.subject_id = s.id
         JOIN users u ON f.uploaded_by = u.id
         WHERE 1=1",
    );
    let mut count_sql = String::from("SELECT COUNT(*) FROM files f WHERE 1=1");

    if q.subject_id.is_some() {
        sql.push_str(" AND f.subject_id = ?");
        count_sql.push_str(" AND f.subject_id = ?");
    }
    if q.search.is_some() {
        sql.push_str(" AND (f.title LIKE ? OR f.description LIKE ?)");
        count_sql.push_str(" AND (f.title LIKE ? OR f.description LIKE ?)");
    }
    if q.file_type.is_some() {
        sql.push_str(" AND f.file_type LIKE ?");
        count_sql.push_str(" AND f.file_type LIKE ?");
    }
    sql.push_str(" ORDER BY f.created_at DESC LIMIT ? OFFSET ?");

    let search_pattern = q.search.as_ref().map(|s| format!("%{s}%"));
    let type_pattern   = q.file_type.as_ref().map(|t| format!("%{t}%"));

    let mut query = sqlx::query_as::<_, FileRow>(&sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(sid) = q.subject_id {
        query = query.bind(sid);
        count_query = count_query.bind(sid);
    }
    if let Some(ref pattern) = search_pattern {
        query = query.bind(pattern).bind(pattern);
        count_query = count_query.bind(pattern).bind(pattern);
    }
    if let Some(ref pattern) = type_pattern {
        query = query.bind(pattern);
        count_query = count_query.bind(pattern);
    }

    let rows: Vec<FileRow> = query.bind(limit).bind(offset).fetch_all(pool).await?;
    let total: i64 = count_query.fetch_one(pool).await?;
    let total_pages = (total as u64).div_ceil(limit as u64);

    Ok(Json(json!({
        "files": rows,
        "pagination": {
            "currentPage": page,
            "totalPages": total_pages,
            "totalFiles": total,
            "hasNext": (page as u64) < total_pages,
            "hasPrev": page > 1,
        },
    })))
}

async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<FileRow>> {
    let row: FileRow = sqlx::query_as::<_, FileRow>(
        "SELECT f.id, f.title, f.description, f.filename, f.original_name,
                f.file_type, f.file_size, f.subject_id,
                s.name_ar AS subject_name, s.color AS subject_color,
                f.uploaded_by, u.full_name AS uploader_name,
                f.download_count, f.created_at
         FROM files f
         JOIN subjects s ON f.subject_id = s.id
         JOIN users u ON f.uploaded_by = u.id
         WHERE f.id = ?",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound)?;
    Ok(Json(row))
}

/// Upload a study file via `multipart/form-data`.
///
/// Fields:
/// * `file`        — the blob (required)
/// * `title`       — display title (required)
/// * `subject_id`  — owning subject (required)
/// * `description` — optional
async fn upload_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    if !user.role.can(Capability::UploadFiles) {
        return Err(AppError::Forbidden);
    }

    let pool = &state.pool;

    let mut file_data: Option<(String, String, Vec<u8>)> = None; // (original name, mime, bytes)
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut subject_id: Option<i64> = None;

    while let Some(field) = multipart.next_field().await
        .map_err(|e| AppError::BadRequest(e.to_string()))? {
        match field.name() {
            Some("file") => {
                let orig_name = field.file_name()
                    .map(|s| s.to_owned())
                    .unwrap_or_else(|| "upload".into());
                let mime = field.content_type()
                    .map(|s| s.to_owned())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let bytes = field.bytes().await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                file_data = Some((orig_name, mime, bytes.to_vec()));
            }
            Some("title") => {
                title = Some(field.text().await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?);
            }
            Some("description") => {
                description = Some(field.text().await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?);
            }
            Some("subject_id") => {
                let raw = field.text().await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                subject_id = Some(raw.trim().parse::<i64>()
                    .map_err(|_| AppError::BadRequest("Invalid subject_id".into()))?);
            }
            _ => {}
        }
    }

    let (orig_name, mime, bytes) =
        file_data.ok_or_else(|| AppError::BadRequest("Missing file field".into()))?;
    let title = title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("File title and subject are required".into()))?;
    let subject_id = subject_id
        .ok_or_else(|| AppError::BadRequest("File title and subject are required".into()))?;

    validate_upload(&mime, bytes.len(), state.config.upload_max_bytes)?;

    let subject_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM subjects WHERE id = ?)")
        .bind(subject_id)
        .fetch_one(pool)
        .await?;
    if !subject_exists {
        return Err(AppError::BadRequest("Subject does not exist".into()));
    }

    // Teachers may only upload to their own subject; re-fetched from the DB
    // rather than trusted from the token.
    if !user.role.can(Capability::Administer) {
        let own_subject: Option<i64> =
            sqlx::query_scalar("SELECT subject_id FROM users WHERE id = ?")
                .bind(user.user_id)
                .fetch_optional(pool)
                .await?
                .flatten();
        if own_subject != Some(subject_id) {
            return Err(AppError::Forbidden);
        }
    }

    fs::create_dir_all(&state.config.upload_dir).await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Could not create upload dir: {e}")))?;

    let filename  = stored_filename(&orig_name);
    let disk_path = PathBuf::from(&state.config.upload_dir).join(&filename);

    fs::write(&disk_path, &bytes).await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Write failed: {e}")))?;

    let insert = sqlx::query(
        "INSERT INTO files (title, description, filename, original_name, file_type, file_size, subject_id, uploaded_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&title)
    .bind(description.as_deref().unwrap_or(""))
    .bind(&filename)
    .bind(&orig_name)
    .bind(&mime)
    .bind(bytes.len() as i64)
    .bind(subject_id)
    .bind(user.user_id)
    .execute(pool)
    .await;

    // No orphan blobs: remove the file if the metadata insert failed.
    let result = match insert {
        Ok(result) => result,
        Err(err) => {
            let _ = fs::remove_file(&disk_path).await;
            return Err(err.into());
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "File uploaded",
            "fileId": result.last_insert_id(),
            "filename": filename,
        })),
    ))
}

/// Stream a file back with its original name, bumping the download counter.
async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<impl axum::response::IntoResponse> {
    let pool = &state.pool;

    let row: BlobRow = sqlx::query_as::<_, BlobRow>(
        "SELECT filename, original_name, file_type FROM files WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound)?;

    let disk_path = PathBuf::from(&state.config.upload_dir).join(&row.filename);
    if fs::metadata(&disk_path).await.is_err() {
        return Err(AppError::NotFound);
    }

    // Single atomic UPDATE — concurrent downloads each count once.
    sqlx::query("UPDATE files SET download_count = download_count + 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    let bytes = fs::read(&disk_path).await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Read failed: {e}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, row.file_type),
            (header::CONTENT_DISPOSITION, content_disposition(&row.original_name)),
        ],
        bytes,
    ))
}

/// Update file metadata (admin only).
async fn update_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateFileBody>,
) -> AppResult<Json<serde_json::Value>> {
    if !user.role.can(Capability::Administer) {
        return Err(AppError::Forbidden);
    }
    let pool = &state.pool;

    if body.title.trim().is_empty() {
        return Err(AppError::BadRequest("File title and subject are required".into()));
    }

    let subject_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM subjects WHERE id = ?)")
        .bind(body.subject_id)
        .fetch_one(pool)
        .await?;
    if !subject_exists {
        return Err(AppError::BadRequest("Subject does not exist".into()));
    }

    let affected = sqlx::query(
        "UPDATE files SET title = ?, description = ?, subject_id = ? WHERE id = ?",
    )
    .bind(&body.title)
    .bind(body.description.as_deref().unwrap_or(""))
    .bind(body.subject_id)
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "message": "File updated" })))
}

/// Delete a file (admin only). The DB row goes first; blob removal is
/// best-effort and a failure is only logged.
async fn delete_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    if !user.role.can(Capability::Administer) {
        return Err(AppError::Forbidden);
    }
    let pool = &state.pool;

    let filename: String = sqlx::query_scalar("SELECT filename FROM files WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)?;

    sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    let disk_path = PathBuf::from(&state.config.upload_dir).join(&filename);
    if let Err(err) = fs::remove_file(&disk_path).await {
        tracing::warn!(file_id = id, error = ?err, "Could not remove blob from disk");
    }

    Ok(Json(json!({ "message": "File deleted" })))
}

#[derive(sqlx::FromRow, Serialize)]
struct TypeCountRow {
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    kind:  String,
    count: i64,
}

#[derive(sqlx::FromRow, Serialize)]
struct RecentFileRow {
    title:        String,
    subject_name: String,
    created_at:   chrono::NaiveDateTime,
}

/// Aggregate file statistics for the admin dashboard.
async fn file_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<serde_json::Value>> {
    if !user.role.can(Capability::Administer) {
        return Err(AppError::Forbidden);
    }
    let pool = &state.pool;

    let total_files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
        .fetch_one(pool).await?;
    let total_size: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(file_size), 0) FROM files")
        .fetch_one(pool).await?;
    let total_downloads: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(download_count), 0) FROM files")
        .fetch_one(pool).await?;

    let files_by_type: Vec<TypeCountRow> = sqlx::query_as::<_, TypeCountRow>(
        "SELECT
            CASE
                WHEN file_type LIKE '%pdf%' THEN 'pdf'
                WHEN file_type LIKE '%image%' THEN 'image'
                WHEN file_type LIKE '%video%' THEN 'video'
                WHEN file_type LIKE '%word%' OR file_type LIKE '%document%' THEN 'document'
                WHEN file_type LIKE '%powerpoint%' OR file_type LIKE '%presentation%' THEN 'presentation'
                WHEN file_type LIKE '%excel%' OR file_type LIKE '%spreadsheet%' THEN 'spreadsheet'
                ELSE 'other'
            END AS type,
            COUNT(*) AS count
         FROM files
         GROUP BY type",
    )
    .fetch_all(pool)
    .await?;

    let recent_files: Vec<RecentFileRow> = sqlx::query_as::<_, RecentFileRow>(
        "SELECT f.title, s.name_ar AS subject_name, f.created_at
         FROM files f
         JOIN subjects s ON f.subject_id = s.id
         ORDER BY f.created_at DESC
         LIMIT 5",
    )
    .fetch_all(pool)
    .await?;

    Ok(Json(json!({
        "totalFiles": total_files,
        "totalSize": total_size,
        "totalDownloads": total_downloads,
        "filesByType": files_by_type,
        "recentFiles": recent_files,
    })))
}

/// Per-subject counters for the teacher dashboard. Admins may read any
/// subject; teachers only the one they are assigned to.
async fn teacher_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(subject_id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;

    if !user.role.can(Capability::Administer) {
        if !user.role.can(Capability::ViewSubjectStats) {
            return Err(AppError::Forbidden);
        }
        let own_subject: Option<i64> =
            sqlx::query_scalar("SELECT subject_id FROM users WHERE id = ?")
                .bind(user.user_id)
                .fetch_optional(pool)
                .await?
                .flatten();
        if own_subject != Some(subject_id) {
            return Err(AppError::Forbidden);
        }
    }

    let total_files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE subject_id = ?")
        .bind(subject_id)
        .fetch_one(pool).await?;
    let total_downloads: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(download_count), 0) FROM files WHERE subject_id = ?",
    )
    .bind(subject_id)
    .fetch_one(pool).await?;
    let recent_files: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM files WHERE subject_id = ? AND created_at >= DATE_SUB(NOW(), INTERVAL 7 DAY)",
    )
    .bind(subject_id)
    .fetch_one(pool).await?;

    Ok(Json(json!({
        "overview": {
            "totalFiles": total_files,
            "totalDownloads": total_downloads,
            "recentFiles": recent_files,
        },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    #[test]
    fn pdf_within_limit_is_accepted() {
        assert!(validate_upload("application/pdf", 5 * MIB, 100 * MIB).is_ok());
    }

    #[test]
    fn spreadsheet_types_are_accepted() {
        assert!(validate_upload("application/vnd.ms-excel", MIB, 100 * MIB).is_ok());
        assert!(validate_upload(
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            MIB,
            100 * MIB
        )
        .is_ok());
    }

    #[test]
    fn executable_mime_is_rejected() {
        assert!(matches!(
            validate_upload("application/x-msdownload", MIB, 100 * MIB),
            Err(AppError::UnsupportedType)
        ));
    }

    #[test]
    fn oversized_upload_is_rejected() {
        assert!(matches!(
            validate_upload("application/pdf", 101 * MIB, 100 * MIB),
            Err(AppError::TooLarge)
        ));
    }

    #[test]
    fn stored_names_keep_extension_and_never_collide() {
        let a = stored_filename("notes.PDF");
        let b = stored_filename("notes.PDF");
        assert!(a.ends_with(".pdf"));
        assert_ne!(a, b);
    }

    #[test]
    fn stored_name_falls_back_to_bin() {
        assert!(stored_filename("no-extension").ends_with(".bin"));
    }

    #[test]
    fn disposition_carries_original_name_sanitized() {
        assert_eq!(
            content_disposition("notes.pdf"),
            "attachment; filename=\"notes.pdf\""
        );
        assert_eq!(
            content_disposition("a\"b\r\nc.pdf"),
            "attachment; filename=\"a_b__c.pdf\""
        );
    }

    #[tokio::test]
    async fn blob_is_written_and_removed() {
        // Mirrors the upload-failure cleanup path: write then remove.
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join(stored_filename("sample.txt"));

        fs::write(&path, b"hello").await.unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), b"hello");

        fs::remove_file(&path).await.unwrap();
        assert!(fs::metadata(&path).await.is_err());
    }
}
