use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StoreError;

// ============================================================================
// Database
// ============================================================================

/// Handle to the feed store.
///
/// Cheap to clone; every clone shares one SQLite connection pool, so up to
/// ten ingestion workers can hold a handle at once.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `":memory:"` opens a private in-memory store shared by all pooled
    /// connections, which is what the tests use.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Locked` if another process holds the database
    /// past the busy timeout, `StoreError::Migration` if the schema cannot be
    /// created, and `StoreError::Query` for other database errors.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: writers from concurrent workers wait up to 5 seconds
        // for the lock instead of failing with SQLITE_BUSY. Set via pragma() so
        // every pooled connection inherits it.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| match StoreError::from_sqlx(e) {
            StoreError::Query(e) => StoreError::Migration(e.to_string()),
            other => other,
        })?;
        tracing::debug!(path = %path, "Feed store opened");
        Ok(db)
    }

    /// Create the schema if it does not exist yet.
    ///
    /// All statements run in one transaction and use `IF NOT EXISTS`, so
    /// re-running on an existing database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_channels (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                description TEXT,
                link TEXT UNIQUE NOT NULL,
                host TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                created INTEGER NOT NULL,
                updated INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // guid and link are not UNIQUE. Dedup is lookup-before-create, so two
        // workers racing on the same new entry may both insert it.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_items (
                id INTEGER PRIMARY KEY,
                guid TEXT,
                title TEXT NOT NULL,
                description TEXT,
                link TEXT NOT NULL,
                author TEXT NOT NULL DEFAULT '',
                published INTEGER,
                read INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                created INTEGER NOT NULL,
                updated INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feed_items_guid ON feed_items(guid)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feed_items_link ON feed_items(link)")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_channel_items (
                channel_id INTEGER NOT NULL REFERENCES feed_channels(id) ON DELETE CASCADE,
                item_id INTEGER NOT NULL REFERENCES feed_items(id) ON DELETE CASCADE,
                created INTEGER NOT NULL,
                PRIMARY KEY (channel_id, item_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Reverse lookup for "which channels carry this entry"
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_feed_channel_items_item ON feed_channel_items(item_id)",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_channel_logs (
                id INTEGER PRIMARY KEY,
                channel_id INTEGER NOT NULL REFERENCES feed_channels(id) ON DELETE CASCADE,
                created INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_feed_channel_logs_channel ON feed_channel_logs(channel_id, created DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
