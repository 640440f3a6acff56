use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        Ok(Database { pool })
    }

    pub async fn init(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // users — keyed by the Telegram chat id.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                notify_threshold REAL NOT NULL DEFAULT 10.0,
                notify_enabled INTEGER NOT NULL DEFAULT 0,
                check_interval INTEGER NOT NULL DEFAULT 60,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // The UNIQUE constraint is what rejects duplicate bindings; the
        // insert path maps the violation to the "already bound" reply.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bindings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                account TEXT NOT NULL,
                customer_code TEXT NOT NULL,
                room_name TEXT NOT NULL DEFAULT '',
                last_balance REAL NOT NULL DEFAULT 0,
                last_check TIMESTAMP NOT NULL,
                UNIQUE (user_id, account, customer_code)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bindings_user_id ON bindings (user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
impl Database {
    /// Fresh in-memory database with the schema applied. A single
    /// connection, because every new connection to `sqlite::memory:`
    /// would otherwise see its own empty database.
    pub async fn memory() -> Database {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let db = Database { pool };
        db.init().await.expect("schema init");
        db
    }
}
