use super::schema::Database;
use super::types::{Channel, StoreError};

impl Database {
    // ========================================================================
    // Channel Operations
    // ========================================================================

    /// All channels with `enabled = 1`, ordered by id.
    ///
    /// No pagination: the channel set is small enough to hold in memory.
    pub async fn list_enabled_channels(&self) -> Result<Vec<Channel>, StoreError> {
        let channels = sqlx::query_as::<_, Channel>(
            r#"
            SELECT id, title, description, link, host, enabled
            FROM feed_channels
            WHERE enabled = 1
            ORDER BY id
        "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(channels)
    }

    /// Register a channel, or refresh its title/description if the link exists.
    ///
    /// This is the seeding surface used by operators and tests; full channel
    /// management belongs to the external API. `host` is derived from the link.
    ///
    /// # Returns
    ///
    /// The channel id (the existing id when the link was already present).
    pub async fn insert_channel(
        &self,
        link: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<i64, StoreError> {
        let host = url::Url::parse(link)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned));
        let now = chrono::Utc::now().timestamp();

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feed_channels (title, description, link, host, enabled, created, updated)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(link) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                updated = excluded.updated
            RETURNING id
        "#,
        )
        .bind(title)
        .bind(description)
        .bind(link)
        .bind(&host)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(id)
    }

    /// Enable or disable a channel. Returns `false` if no such channel exists.
    pub async fn set_channel_enabled(
        &self,
        channel_id: i64,
        enabled: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE feed_channels SET enabled = ?, updated = ? WHERE id = ?")
            .bind(enabled)
            .bind(chrono::Utc::now().timestamp())
            .bind(channel_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }
}
