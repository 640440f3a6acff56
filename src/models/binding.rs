use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, SqlitePool};

/// One linked (account, customer code) pair for one user, with the
/// last-known room and balance cached for display and alerting.
#[derive(Debug, Clone, FromRow)]
pub struct Binding {
    pub id: i64,
    pub user_id: i64,
    /// Student or card number, opaque to the bot.
    pub account: String,
    /// Identifies the school inside the Wanxiao service.
    pub customer_code: String,
    pub room_name: String,
    pub last_balance: f64,
    pub last_check: DateTime<Utc>,
}

const COLUMNS: &str = "id, user_id, account, customer_code, room_name, last_balance, last_check";

impl Binding {
    pub async fn for_user(pool: &SqlitePool, user_id: i64) -> sqlx::Result<Vec<Binding>> {
        sqlx::query_as::<_, Binding>(&format!(
            "SELECT {COLUMNS} FROM bindings WHERE user_id = ? ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Snapshot of every binding, for the monitoring pass.
    pub async fn all(pool: &SqlitePool) -> sqlx::Result<Vec<Binding>> {
        sqlx::query_as::<_, Binding>(&format!("SELECT {COLUMNS} FROM bindings ORDER BY id"))
            .fetch_all(pool)
            .await
    }

    /// Creates a binding seeded with the verified room and balance.
    ///
    /// Returns `None` when the (user, account, customer code) tuple is
    /// already bound — uniqueness is enforced by the table constraint,
    /// so a concurrent duplicate submit cannot slip through between a
    /// check and an insert.
    pub async fn create(
        pool: &SqlitePool,
        user_id: i64,
        account: &str,
        customer_code: &str,
        room_name: &str,
        balance: f64,
        now: DateTime<Utc>,
    ) -> sqlx::Result<Option<Binding>> {
        let result = sqlx::query(
            "INSERT INTO bindings (user_id, account, customer_code, room_name, last_balance, last_check)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(account)
        .bind(customer_code)
        .bind(room_name)
        .bind(balance)
        .bind(now)
        .execute(pool)
        .await;

        match result {
            Ok(done) => Ok(Some(Binding {
                id: done.last_insert_rowid(),
                user_id,
                account: account.to_string(),
                customer_code: customer_code.to_string(),
                room_name: room_name.to_string(),
                last_balance: balance,
                last_check: now,
            })),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Removes the user's bindings for one account. Returns the number
    /// of rows deleted; repeating the same unbind is a no-op yielding 0.
    pub async fn delete(pool: &SqlitePool, user_id: i64, account: &str) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM bindings WHERE user_id = ? AND account = ?")
            .bind(user_id)
            .bind(account)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Refreshes the cached room, balance and check timestamp after a
    /// successful poll. This is the only writer of `last_check`, so a
    /// failed poll automatically leaves the binding due for retry.
    pub async fn update_cache(
        pool: &SqlitePool,
        id: i64,
        room_name: &str,
        balance: f64,
        now: DateTime<Utc>,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE bindings SET room_name = ?, last_balance = ?, last_check = ? WHERE id = ?",
        )
        .bind(room_name)
        .bind(balance)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// A binding is due once the configured interval has fully elapsed
    /// since its last successful check.
    pub fn is_due(&self, interval_minutes: i64, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_check) >= Duration::minutes(interval_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[tokio::test]
    async fn duplicate_binding_is_rejected() {
        let db = Database::memory().await;
        let now = Utc::now();

        let first = Binding::create(&db.pool, 1, "20231001", "233", "1-101", 42.0, now)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = Binding::create(&db.pool, 1, "20231001", "233", "1-101", 42.0, now)
            .await
            .unwrap();
        assert!(second.is_none());

        // Same account under a different school code is a new binding.
        let other = Binding::create(&db.pool, 1, "20231001", "666", "1-101", 42.0, now)
            .await
            .unwrap();
        assert!(other.is_some());

        assert_eq!(Binding::for_user(&db.pool, 1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unbind_is_idempotent() {
        let db = Database::memory().await;
        Binding::create(&db.pool, 1, "20231001", "233", "1-101", 42.0, Utc::now())
            .await
            .unwrap();

        assert_eq!(Binding::delete(&db.pool, 1, "20231001").await.unwrap(), 1);
        assert_eq!(Binding::delete(&db.pool, 1, "20231001").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unbind_only_touches_the_owning_user() {
        let db = Database::memory().await;
        let now = Utc::now();
        Binding::create(&db.pool, 1, "20231001", "233", "1-101", 42.0, now)
            .await
            .unwrap();
        Binding::create(&db.pool, 2, "20231001", "233", "1-101", 42.0, now)
            .await
            .unwrap();

        assert_eq!(Binding::delete(&db.pool, 1, "20231001").await.unwrap(), 1);
        assert_eq!(Binding::for_user(&db.pool, 2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_cache_refreshes_fields_and_timestamp() {
        let db = Database::memory().await;
        let old = Utc::now() - Duration::minutes(90);
        let binding = Binding::create(&db.pool, 1, "20231001", "233", "1-101", 42.0, old)
            .await
            .unwrap()
            .unwrap();

        let now = Utc::now();
        Binding::update_cache(&db.pool, binding.id, "1-101", 3.0, now)
            .await
            .unwrap();

        let refreshed = Binding::for_user(&db.pool, 1).await.unwrap().remove(0);
        assert_eq!(refreshed.last_balance, 3.0);
        assert!(refreshed.last_check > old);
        assert!(!refreshed.is_due(60, now));
    }

    #[test]
    fn due_exactly_at_the_interval_boundary() {
        let now = Utc::now();
        let binding = Binding {
            id: 1,
            user_id: 1,
            account: "20231001".to_string(),
            customer_code: "233".to_string(),
            room_name: "1-101".to_string(),
            last_balance: 42.0,
            last_check: now - Duration::minutes(60),
        };

        assert!(binding.is_due(60, now));
        assert!(binding.is_due(1, now));
        assert!(!binding.is_due(61, now));
    }
}
