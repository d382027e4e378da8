#![allow(dead_code)]

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ── Roles ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Admin,
    Teacher,
}

/// Actions gated by role. All role checks in the routers go through
/// [`UserRole::can`] so the permission matrix lives in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Full administrative access: user/subject/path/scenario CRUD,
    /// file metadata edits and deletes, admin stats.
    Administer,
    /// Upload study files. Teachers hold this only for their own subject;
    /// the subject restriction is enforced at the upload handler.
    UploadFiles,
    /// Read per-subject statistics (teachers: own subject only).
    ViewSubjectStats,
}

impl UserRole {
    pub fn can(self, capability: Capability) -> bool {
        match (self, capability) {
            (UserRole::Admin, _) => true,
            (UserRole::Teacher, Capability::UploadFiles) => true,
            (UserRole::Teacher, Capability::ViewSubjectStats) => true,
            _ => false,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "student" => Some(UserRole::Student),
            "admin"   => Some(UserRole::Admin),
            "teacher" => Some(UserRole::Teacher),
            _         => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserRole::Student => "student",
            UserRole::Admin   => "admin",
            UserRole::Teacher => "teacher",
        };
        write!(f, "{s}")
    }
}

// ── Users ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id:            i64,
    pub username:      String,
    pub email:         String,
    pub password_hash: String,
    pub role:          UserRole,
    pub full_name:     String,
    pub subject_id:    Option<i64>,
    pub path_id:       Option<i64>,
    pub scenario_id:   Option<i64>,
    pub created_at:    NaiveDateTime,
    pub updated_at:    NaiveDateTime,
}

// ── Subjects ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subject {
    pub id:          i64,
    pub name:        String,
    pub name_ar:     String,
    pub description: Option<String>,
    pub color:       String,
    pub icon:        String,
    pub created_at:  NaiveDateTime,
    pub updated_at:  NaiveDateTime,
}

// ── Files ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudyFile {
    pub id:             i64,
    pub title:          String,
    pub description:    Option<String>,
    pub filename:       String,
    pub original_name:  String,
    pub file_type:      String,
    pub file_size:      i64,
    pub subject_id:     i64,
    pub uploaded_by:    i64,
    pub download_count: i64,
    pub created_at:     NaiveDateTime,
    pub updated_at:     NaiveDateTime,
}

// ── Curriculum paths ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CurriculumPath {
    pub id:          i64,
    pub name:        String,
    pub name_ar:     String,
    pub description: Option<String>,
    pub created_at:  NaiveDateTime,
    pub updated_at:  NaiveDateTime,
}

// ── Scenarios ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Scenario {
    pub id:          i64,
    pub path_id:     i64,
    pub name:        String,
    pub name_ar:     String,
    pub description: Option<String>,
    pub created_at:  NaiveDateTime,
    pub updated_at:  NaiveDateTime,
}

/// Join row linking a scenario to a subject, with the mandatory/elective flag.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScenarioSubject {
    pub scenario_id: i64,
    pub subject_id:  i64,
    pub is_core:     bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_holds_every_capability() {
        for cap in [Capability::Administer, Capability::UploadFiles, Capability::ViewSubjectStats] {
            assert!(UserRole::Admin.can(cap));
        }
    }

    #[test]
    fn teacher_can_upload_but_not_administer() {
        assert!(UserRole::Teacher.can(Capability::UploadFiles));
        assert!(UserRole::Teacher.can(Capability::ViewSubjectStats));
        assert!(!UserRole::Teacher.can(Capability::Administer));
    }

    #[test]
    fn student_holds_no_capability() {
        for cap in [Capability::Administer, Capability::UploadFiles, Capability::ViewSubjectStats] {
            assert!(!UserRole::Student.can(cap));
        }
    }

    #[test]
    fn role_parse_round_trip() {
        for role in [UserRole::Student, UserRole::Admin, UserRole::Teacher] {
            assert_eq!(UserRole::parse(&role.to_string()), Some(role));
        }
        assert_eq!(UserRole::parse("parent"), None);
    }
}
