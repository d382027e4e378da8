//! `/scenarios` routes — subject bundles under a curriculum path.
//!
//! Scenario listings return nested subject arrays built from a normalized
//! join query and grouped in application code; nothing is parsed out of
//! database-generated JSON strings.

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
        .route("/scenarios",               get(list_scenarios))
        .route("/scenarios/{id}",          get(get_scenario))
        .route("/scenarios/path/{path_id}", get(scenarios_by_path))
        .route("/scenarios/{id}/subjects", get(scenario_subjects))
}

pub fn admin_router() -> Router<AppState> {
    use axum::middleware;
    use axum::routing::{delete, post, put};
    let admin_guard = middleware::from_fn(require_admin);
    Router::new()
        .route("/scenarios",               post(create_scenario))
        .route("/scenarios/{id}",          put(update_scenario).delete(delete_scenario))
        .route("/scenarios/{id}/subjects", post(link_subjects))
        .route("/scenarios/{id}/subjects/{subject_id}", delete(unlink_subject))
        .route("/scenarios/{id}/users",    get(scenario_users))
        .route_layer(admin_guard)
}

// ── Row / DTO types ──────────────────────────────────────────

/// One row of the scenario × subject join. Subject columns are `NULL` for
/// scenarios with no linked subjects (LEFT JOIN).
#[derive(sqlx::FromRow)]
struct ScenarioJoinRow {
    id:              i64,
    path_id:         i64,
    name:            String,
    name_ar:         String,
    description:     Option<String>,
    path_name:       String,
    subject_id:      Option<i64>,
    subject_name:    Option<String>,
    subject_name_ar: Option<String>,
    subject_color:   Option<String>,
    subject_icon:    Option<String>,
    is_core:         Option<bool>,
}

#[derive(Serialize)]
struct ScenarioDto {
    id:          i64,
    path_id:     i64,
    name:        String,
    name_ar:     String,
    description: Option<String>,
    path_name:   String,
    subjects:    Vec<LinkedSubjectDto>,
}

#[derive(Serialize)]
struct LinkedSubjectDto {
    id:      i64,
    name:    String,
    name_ar: String,
    color:   String,
    icon:    String,
    is_core: bool,
}

#[derive(sqlx::FromRow, Serialize)]
struct SubjectOfScenarioRow {
    id:          i64,
    name:        String,
    name_ar:     String,
    description: Option<String>,
    color:       String,
    icon:        String,
    is_core:     bool,
}

#[derive(sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioUserRow {
    id:         i64,
    username:   String,
    full_name:  String,
    email:      String,
    created_at: chrono::NaiveDateTime,
}

// ── Request bodies ───────────────────────────────────────────

#[derive(Deserialize)]
struct CreateScenarioBody {
    path_id:     i64,
    name:        String,
    name_ar:     String,
    description: Option<String>,
}

#[derive(Deserialize)]
struct UpdateScenarioBody {
    name:        String,
    name_ar:     String,
    description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkSubjectsBody {
    subject_ids: Vec<SubjectLinkSpec>,
}

/// A linked subject is either a bare id or an object carrying the core flag.
#[derive(Deserialize)]
#[serde(untagged)]
enum SubjectLinkSpec {
    Id(i64),
    Full { id: i64, is_core: Option<bool> },
}

impl SubjectLinkSpec {
    fn parts(&self) -> (i64, bool) {
        match self {
            SubjectLinkSpec::Id(id) => (*id, false),
            SubjectLinkSpec::Full { id, is_core } => (*id, is_core.unwrap_or(false)),
        }
    }
}

// ── Aggregation ──────────────────────────────────────────────

/// Folds ordered join rows into scenarios with nested subject lists.
/// Rows must arrive sorted by scenario id (the queries order by it).
fn group_scenarios(rows: Vec<ScenarioJoinRow>) -> Vec<ScenarioDto> {
    let mut scenarios: Vec<ScenarioDto> = Vec::new();

    for row in rows {
        if scenarios.last().map(|s| s.id) != Some(row.id) {
            scenarios.push(ScenarioDto {
                id:          row.id,
                path_id:     row.path_id,
                name:        row.name,
                name_ar:     row.name_ar,
                description: row.description,
                path_name:   row.path_name,
                subjects:    Vec::new(),
            });
        }

        if let (Some(id), Some(name), Some(name_ar)) =
            (row.subject_id, row.subject_name, row.subject_name_ar)
        {
            if let Some(current) = scenarios.last_mut() {
                current.subjects.push(LinkedSubjectDto {
                    id,
                    name,
                    name_ar,
                    color:   row.subject_color.unwrap_or_default(),
                    icon:    row.subject_icon.unwrap_or_default(),
                    is_core: row.is_core.unwrap_or(false),
                });
            }
        }
    }

    scenarios
}

const SCENARIO_JOIN_SELECT: &str =
    "SELECT s.id, s.path_id, s.name, s.name_ar, s.description,
            p.name_ar AS path_name,
            sub.id AS subject_id, sub.name AS subject_name,
            sub.name_ar AS subject_name_ar, sub.color AS subject_color,
            sub.icon AS subject_icon, ss.is_core
     FROM scenarios s
     JOIN paths p ON s.path_id = p.id
     LEFT JOIN scenario_subjects ss ON s.id = ss.scenario_id
     LEFT JOIN subjects sub ON ss.subject_id = sub.id";

// ── Handlers ─────────────────────────────────────────────────

async fn list_scenarios(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let sql = format!("{SCENARIO_JOIN_SELECT} ORDER BY s.path_id, s.id");
    let rows: Vec<ScenarioJoinRow> = sqlx::query_as::<_, ScenarioJoinRow>(&sql)
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(json!({ "data": group_scenarios(rows) })))
}

async fn get_scenario(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let sql = format!("{SCENARIO_JOIN_SELECT} WHERE s.id = ? ORDER BY s.id");
    let rows: Vec<ScenarioJoinRow> = sqlx::query_as::<_, ScenarioJoinRow>(&sql)
        .bind(id)
        .fetch_all(&state.pool)
        .await?;

    let scenario = group_scenarios(rows)
        .into_iter()
        .next()
        .ok_or(AppError::NotFound)?;
    Ok(Json(json!({ "data": scenario })))
}

async fn scenarios_by_path(
    State(state): State<AppState>,
    Path(path_id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let sql = format!("{SCENARIO_JOIN_SELECT} WHERE s.path_id = ? ORDER BY s.id");
    let rows: Vec<ScenarioJoinRow> = sqlx::query_as::<_, ScenarioJoinRow>(&sql)
        .bind(path_id)
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(json!({ "data": group_scenarios(rows) })))
}

/// Subjects of one scenario, core subjects first.
async fn scenario_subjects(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let rows: Vec<SubjectOfScenarioRow> = sqlx::query_as::<_, SubjectOfScenarioRow>(
        "SELECT sub.id, sub.name, sub.name_ar, sub.description, sub.color, sub.icon, ss.is_core
         FROM scenario_subjects ss
         JOIN subjects sub ON ss.subject_id = sub.id
         WHERE ss.scenario_id = ?
         ORDER BY ss.is_core DESC, sub.name_ar",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_scenario(
    State(state): State<AppState>,
    Json(body): Json<CreateScenarioBody>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let pool = &state.pool;

    if body.name.trim().is_empty() || body.name_ar.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Path id and scenario name are required".into(),
        ));
    }

    let path_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM paths WHERE id = ?)")
        .bind(body.path_id)
        .fetch_one(pool)
        .await?;
    if !path_exists {
        return Err(AppError::BadRequest("Path does not exist".into()));
    }

    let result = sqlx::query(
        "INSERT INTO scenarios (path_id, name, name_ar, description) VALUES (?, ?, ?, ?)",
    )
    .bind(body.path_id)
    .bind(&body.name)
    .bind(&body.name_ar)
    .bind(body.description.as_deref().unwrap_or(""))
    .execute(pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Scenario created",
            "scenarioId": result.last_insert_id(),
        })),
    ))
}

async fn update_scenario(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateScenarioBody>,
) -> AppResult<Json<serde_json::Value>> {
    if body.name.trim().is_empty() || body.name_ar.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Scenario name is required in both languages".into(),
        ));
    }

    let affected = sqlx::query(
        "UPDATE scenarios SET name = ?, name_ar = ?, description = ? WHERE id = ?",
    )
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
    Ok(Json(json!({ "message": "Scenario updated" })))
}

/// Resolves a link request into the exact `(subject_id, is_core)` rows that
/// exist after the replace. Duplicate ids keep their first occurrence so the
/// composite primary key cannot be violated by a sloppy request body.
fn replacement_links(entries: &[SubjectLinkSpec]) -> Vec<(i64, bool)> {
    let mut links: Vec<(i64, bool)> = Vec::with_capacity(entries.len());
    for entry in entries {
        let (id, is_core) = entry.parts();
        if !links.iter().any(|(existing, _)| *existing == id) {
            links.push((id, is_core));
        }
    }
    links
}

/// Replace ALL subject links of a scenario in one delete + insert pass.
/// Full-replace semantics: links absent from the request are dropped.
async fn link_subjects(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<LinkSubjectsBody>,
) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;

    if body.subject_ids.is_empty() {
        return Err(AppError::BadRequest("A list of subject ids is required".into()));
    }

    let scenario_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM scenarios WHERE id = ?)")
            .bind(id)
            .fetch_one(pool)
            .await?;
    if !scenario_exists {
        return Err(AppError::NotFound);
    }

    let links = replacement_links(&body.subject_ids);

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM scenario_subjects WHERE scenario_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    for (subject_id, is_core) in &links {
        sqlx::query(
            "INSERT INTO scenario_subjects (scenario_id, subject_id, is_core) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(subject_id)
        .bind(is_core)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(Json(json!({
        "message": "Subjects linked to scenario",
        "linkedSubjects": links.len(),
    })))
}

/// Remove a single subject link.
async fn unlink_subject(
    State(state): State<AppState>,
    Path((id, subject_id)): Path<(i64, i64)>,
) -> AppResult<Json<serde_json::Value>> {
    let affected = sqlx::query(
        "DELETE FROM scenario_subjects WHERE scenario_id = ? AND subject_id = ?",
    )
    .bind(id)
    .bind(subject_id)
    .execute(&state.pool)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "message": "Subject unlinked" })))
}

/// Delete a scenario. Rejected while any user references it; subject links
/// cascade away with the row.
async fn delete_scenario(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let pool = &state.pool;

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE scenario_id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    if user_count > 0 {
        return Err(AppError::BadRequest(
            "Cannot delete scenario: users are still assigned to it".into(),
        ));
    }

    let affected = sqlx::query("DELETE FROM scenarios WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    if affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "message": "Scenario deleted" })))
}

/// Users currently assigned to a scenario.
async fn scenario_users(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let rows: Vec<ScenarioUserRow> = sqlx::query_as::<_, ScenarioUserRow>(
        "SELECT id, username, full_name, email, created_at
         FROM users
         WHERE scenario_id = ?
         ORDER BY full_name",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(json!({ "data": rows })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        scenario: i64,
        subject: Option<(i64, &str, bool)>,
    ) -> ScenarioJoinRow {
        ScenarioJoinRow {
            id:              scenario,
            path_id:         1,
            name:            format!("scenario-{scenario}"),
            name_ar:         format!("سيناريو-{scenario}"),
            description:     None,
            path_name:       "عام".into(),
            subject_id:      subject.map(|(id, _, _)| id),
            subject_name:    subject.map(|(_, name, _)| name.to_string()),
            subject_name_ar: subject.map(|(_, name, _)| name.to_string()),
            subject_color:   subject.map(|_| "#fff".into()),
            subject_icon:    subject.map(|_| "book".into()),
            is_core:         subject.map(|(_, _, core)| core),
        }
    }

    #[test]
    fn groups_rows_into_nested_subjects() {
        let rows = vec![
            row(1, Some((10, "math", true))),
            row(1, Some((11, "physics", false))),
            row(2, Some((10, "math", true))),
        ];

        let grouped = group_scenarios(rows);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].subjects.len(), 2);
        assert!(grouped[0].subjects[0].is_core);
        assert_eq!(grouped[1].subjects.len(), 1);
    }

    #[test]
    fn scenario_without_subjects_gets_empty_list() {
        let grouped = group_scenarios(vec![row(7, None)]);
        assert_eq!(grouped.len(), 1);
        assert!(grouped[0].subjects.is_empty());
    }

    #[test]
    fn empty_input_yields_no_scenarios() {
        assert!(group_scenarios(Vec::new()).is_empty());
    }

    #[test]
    fn link_spec_accepts_ids_and_objects() {
        let body: LinkSubjectsBody =
            serde_json::from_str(r#"{"subjectIds": [3, {"id": 4, "is_core": true}]}"#).unwrap();
        assert_eq!(body.subject_ids[0].parts(), (3, false));
        assert_eq!(body.subject_ids[1].parts(), (4, true));
    }

    #[test]
    fn replacement_contains_only_requested_subjects() {
        // A second replace request fully supersedes the first: the rows
        // written are derived from this request alone.
        let first: LinkSubjectsBody =
            serde_json::from_str(r#"{"subjectIds": [1, 2, 3]}"#).unwrap();
        let second: LinkSubjectsBody =
            serde_json::from_str(r#"{"subjectIds": [4]}"#).unwrap();

        assert_eq!(replacement_links(&first.subject_ids), vec![(1, false), (2, false), (3, false)]);
        assert_eq!(replacement_links(&second.subject_ids), vec![(4, false)]);
    }

    #[test]
    fn duplicate_subject_ids_are_collapsed() {
        let body: LinkSubjectsBody = serde_json::from_str(
            r#"{"subjectIds": [{"id": 5, "is_core": true}, 5, 6]}"#,
        )
        .unwrap();
        assert_eq!(replacement_links(&body.subject_ids), vec![(5, true), (6, false)]);
    }
}
