use super::schema::Database;
use super::types::{FetchLog, StoreError};

impl Database {
    // ========================================================================
    // Fetch Log
    // ========================================================================

    /// Append one row recording a completed processing pass for a channel.
    pub async fn append_fetch_log(&self, channel_id: i64) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO feed_channel_logs (channel_id, created) VALUES (?, ?)")
            .bind(channel_id)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        Ok(())
    }

    /// Fetch log rows for a channel, newest first.
    pub async fn fetch_logs_for_channel(
        &self,
        channel_id: i64,
    ) -> Result<Vec<FetchLog>, StoreError> {
        sqlx::query_as::<_, FetchLog>(
            r#"
            SELECT id, channel_id, created
            FROM feed_channel_logs
            WHERE channel_id = ?
            ORDER BY created DESC, id DESC
        "#,
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Database;

    #[tokio::test]
    async fn test_append_fetch_log_is_append_only() {
        let db = Database::open(":memory:").await.unwrap();
        let channel = db
            .insert_channel("https://example.com/rss", "Example", None)
            .await
            .unwrap();

        db.append_fetch_log(channel).await.unwrap();
        db.append_fetch_log(channel).await.unwrap();

        let logs = db.fetch_logs_for_channel(channel).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.channel_id == channel));
        assert!(logs[0].id > logs[1].id);
    }

    #[tokio::test]
    async fn test_fetch_logs_are_per_channel() {
        let db = Database::open(":memory:").await.unwrap();
        let a = db.insert_channel("https://a.example.com/rss", "A", None).await.unwrap();
        let b = db.insert_channel("https://b.example.com/rss", "B", None).await.unwrap();

        db.append_fetch_log(a).await.unwrap();

        assert_eq!(db.fetch_logs_for_channel(a).await.unwrap().len(), 1);
        assert!(db.fetch_logs_for_channel(b).await.unwrap().is_empty());
    }
}
