use crate::auth::hash_password;
use crate::db::Db;

/// Seeds the admin account and the default subject catalogue.
/// Safe to call on every startup — existence is checked before inserting.
pub async fn seed_defaults(pool: &Db) -> anyhow::Result<()> {
    seed_admin(pool).await?;
    seed_subjects(pool).await?;
    Ok(())
}

async fn seed_admin(pool: &Db) -> anyhow::Result<()> {
    const ADMIN_USERNAME: &str = "admin";
    const ADMIN_EMAIL: &str = "admin@studyportal.local";
    const ADMIN_PASSWORD: &str = "admin123";

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ? AND role = 'admin')",
    )
    .bind(ADMIN_USERNAME)
    .fetch_one(pool)
    .await?;

    if !exists {
        let hash = hash_password(ADMIN_PASSWORD)
            .map_err(|e| anyhow::anyhow!("Failed to hash seed password: {e:?}"))?;
        sqlx::query(
            "INSERT INTO users (username, email, password_hash, role, full_name)
             VALUES (?, ?, ?, 'admin', 'Platform Administrator')",
        )
        .bind(ADMIN_USERNAME)
        .bind(ADMIN_EMAIL)
        .bind(hash)
        .execute(pool)
        .await?;
        tracing::info!("Seeded admin account");
    }

    Ok(())
}

/// The grade-11 subject catalogue, in both languages.
const DEFAULT_SUBJECTS: &[(&str, &str, &str, &str, &str)] = &[
    ("mathematics", "الرياضيات",        "مادة الرياضيات للصف الحادي عشر",        "#ff6b6b", "calculator"),
    ("physics",     "الفيزياء",         "مادة الفيزياء للصف الحادي عشر",          "#4ecdc4", "atom"),
    ("chemistry",   "الكيمياء",         "مادة الكيمياء للصف الحادي عشر",          "#45b7d1", "flask"),
    ("english",     "اللغة الإنجليزية", "مادة اللغة الإنجليزية للصف الحادي عشر", "#96ceb4", "language"),
    ("arabic",      "اللغة العربية",    "مادة اللغة العربية للصف الحادي عشر",    "#feca57", "book-open"),
    ("biology",     "الأحياء",          "مادة الأحياء للصف الحادي عشر",           "#ff9ff3", "leaf"),
];

async fn seed_subjects(pool: &Db) -> anyhow::Result<()> {
    let mut inserted = 0u32;

    for (name, name_ar, description, color, icon) in DEFAULT_SUBJECTS {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM subjects WHERE name = ? OR name_ar = ?)",
        )
        .bind(name)
        .bind(name_ar)
        .fetch_one(pool)
        .await?;

        if !exists {
            sqlx::query(
                "INSERT INTO subjects (name, name_ar, description, color, icon)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(name)
            .bind(name_ar)
            .bind(description)
            .bind(color)
            .bind(icon)
            .execute(pool)
            .await?;
            inserted += 1;
        }
    }

    if inserted > 0 {
        tracing::info!(subjects = inserted, "Seeded default subjects");
    }

    Ok(())
}
