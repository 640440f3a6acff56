use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

/// One Telegram user and their alert settings. Created on first
/// interaction, never deleted by the bot.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    /// Low-balance threshold in 度 (kWh).
    pub notify_threshold: f64,
    pub notify_enabled: bool,
    /// Per-binding check cadence in minutes, always >= 1.
    pub check_interval: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, notify_threshold, notify_enabled, check_interval, created_at, updated_at";

impl User {
    pub async fn get(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Inserts a row with default settings if the user is new, then
    /// returns the current record.
    pub async fn get_or_create(pool: &SqlitePool, id: i64) -> sqlx::Result<User> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (id, created_at, updated_at) VALUES (?, ?, ?)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_one(pool)
            .await
    }

    pub async fn set_threshold(pool: &SqlitePool, id: i64, threshold: f64) -> sqlx::Result<()> {
        sqlx::query("UPDATE users SET notify_threshold = ?, updated_at = ? WHERE id = ?")
            .bind(threshold)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn set_interval(pool: &SqlitePool, id: i64, minutes: i64) -> sqlx::Result<()> {
        sqlx::query("UPDATE users SET check_interval = ?, updated_at = ? WHERE id = ?")
            .bind(minutes)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn set_enabled(pool: &SqlitePool, id: i64, enabled: bool) -> sqlx::Result<()> {
        sqlx::query("UPDATE users SET notify_enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Everyone the monitoring pass has to look at.
    pub async fn all_enabled(pool: &SqlitePool) -> sqlx::Result<Vec<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {COLUMNS} FROM users WHERE notify_enabled = 1"
        ))
        .fetch_all(pool)
        .await
    }
}
