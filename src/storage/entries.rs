use super::schema::Database;
use super::types::{Entry, NewEntry, StoreError};

const ENTRY_COLUMNS: &str =
    "id, guid, title, description, link, author, published, read, deleted, created, updated";

impl Database {
    // ========================================================================
    // Entry Lookups
    // ========================================================================

    /// Find an entry by exact guid. An empty guid never matches.
    ///
    /// When a lookup/create race left duplicates behind, the oldest row wins.
    pub async fn find_entry_by_guid(&self, guid: &str) -> Result<Option<Entry>, StoreError> {
        if guid.is_empty() {
            return Ok(None);
        }

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM feed_items WHERE guid = ? ORDER BY id LIMIT 1"
        );
        sqlx::query_as::<_, Entry>(&sql)
            .bind(guid)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    /// Find an entry by exact link, oldest row first.
    pub async fn find_entry_by_link(&self, link: &str) -> Result<Option<Entry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM feed_items WHERE link = ? ORDER BY id LIMIT 1"
        );
        sqlx::query_as::<_, Entry>(&sql)
            .bind(link)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    pub async fn get_entry(&self, entry_id: i64) -> Result<Option<Entry>, StoreError> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM feed_items WHERE id = ?");
        sqlx::query_as::<_, Entry>(&sql)
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    /// Entries associated with a channel, oldest first.
    pub async fn list_entries_for_channel(
        &self,
        channel_id: i64,
    ) -> Result<Vec<Entry>, StoreError> {
        sqlx::query_as::<_, Entry>(
            r#"
            SELECT i.id, i.guid, i.title, i.description, i.link, i.author, i.published,
                   i.read, i.deleted, i.created, i.updated
            FROM feed_items i
            JOIN feed_channel_items ci ON ci.item_id = i.id
            WHERE ci.channel_id = ?
            ORDER BY i.id
        "#,
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    pub async fn count_entries(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feed_items")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(count)
    }

    // ========================================================================
    // Entry Mutations
    // ========================================================================

    /// Insert a new entry with `read = 0`, `deleted = 0` and fresh timestamps.
    pub async fn create_entry(&self, entry: &NewEntry) -> Result<Entry, StoreError> {
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            r#"
            INSERT INTO feed_items (guid, title, description, link, author, published,
                                    read, deleted, created, updated)
            VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
            RETURNING {ENTRY_COLUMNS}
        "#
        );

        sqlx::query_as::<_, Entry>(&sql)
            .bind(&entry.guid)
            .bind(&entry.title)
            .bind(&entry.description)
            .bind(&entry.link)
            .bind(&entry.author)
            .bind(entry.published)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    /// Short-form content update: only `title`, `description` and `link`.
    ///
    /// `author`, `published` and the read/deleted flags are left untouched.
    pub async fn update_entry_short(
        &self,
        entry_id: i64,
        title: &str,
        description: Option<&str>,
        link: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE feed_items
            SET title = ?, description = ?, link = ?, updated = ?
            WHERE id = ?
        "#,
        )
        .bind(title)
        .bind(description)
        .bind(link)
        .bind(chrono::Utc::now().timestamp())
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(())
    }

    // ========================================================================
    // Channel Associations
    // ========================================================================

    /// Record that `entry_id` was seen in `channel_id`'s feed.
    ///
    /// Idempotent: an existing pair is left alone.
    ///
    /// # Returns
    ///
    /// `true` if a new association row was written.
    pub async fn ensure_channel_entry(
        &self,
        channel_id: i64,
        entry_id: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO feed_channel_items (channel_id, item_id, created) VALUES (?, ?, ?)",
        )
        .bind(channel_id)
        .bind(entry_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Ids of the channels an entry is associated with, ascending.
    pub async fn channel_ids_for_entry(&self, entry_id: i64) -> Result<Vec<i64>, StoreError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT channel_id FROM feed_channel_items WHERE item_id = ? ORDER BY channel_id",
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, NewEntry};
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn new_entry(guid: Option<&str>, link: &str) -> NewEntry {
        NewEntry {
            guid: guid.map(str::to_owned),
            title: "Title".to_string(),
            description: Some("Body".to_string()),
            link: link.to_string(),
            author: "Jane (jane@example.com)".to_string(),
            published: Some(1704067200),
        }
    }

    #[tokio::test]
    async fn test_create_entry_sets_defaults() {
        let db = test_db().await;

        let entry = db
            .create_entry(&new_entry(Some("g1"), "https://example.com/1"))
            .await
            .unwrap();

        assert!(entry.id > 0);
        assert_eq!(entry.guid.as_deref(), Some("g1"));
        assert_eq!(entry.title, "Title");
        assert_eq!(entry.description.as_deref(), Some("Body"));
        assert_eq!(entry.link, "https://example.com/1");
        assert_eq!(entry.author, "Jane (jane@example.com)");
        assert_eq!(entry.published, Some(1704067200));
        assert!(!entry.read);
        assert!(!entry.deleted);
        assert_eq!(entry.created, entry.updated);

        let fetched = db.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(fetched, entry);
    }

    #[tokio::test]
    async fn test_find_entry_by_guid_and_link() {
        let db = test_db().await;
        let created = db
            .create_entry(&new_entry(Some("g1"), "https://example.com/1"))
            .await
            .unwrap();

        let by_guid = db.find_entry_by_guid("g1").await.unwrap().unwrap();
        assert_eq!(by_guid.id, created.id);

        let by_link = db
            .find_entry_by_link("https://example.com/1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_link.id, created.id);

        assert!(db.find_entry_by_guid("g2").await.unwrap().is_none());
        assert!(db
            .find_entry_by_link("https://example.com/2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_find_entry_by_empty_guid_never_matches() {
        let db = test_db().await;
        db.create_entry(&new_entry(None, "https://example.com/1"))
            .await
            .unwrap();

        assert!(db.find_entry_by_guid("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_entry_prefers_oldest_duplicate() {
        let db = test_db().await;
        let first = db
            .create_entry(&new_entry(Some("dup"), "https://example.com/a"))
            .await
            .unwrap();
        db.create_entry(&new_entry(Some("dup"), "https://example.com/a"))
            .await
            .unwrap();

        let found = db.find_entry_by_guid("dup").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        let found = db
            .find_entry_by_link("https://example.com/a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_update_entry_short_leaves_other_fields() {
        let db = test_db().await;
        let entry = db
            .create_entry(&new_entry(Some("g1"), "https://example.com/1"))
            .await
            .unwrap();

        db.update_entry_short(entry.id, "New title", None, "https://example.com/new")
            .await
            .unwrap();

        let updated = db.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(updated.title, "New title");
        assert_eq!(updated.description, None);
        assert_eq!(updated.link, "https://example.com/new");
        assert_eq!(updated.guid, entry.guid);
        assert_eq!(updated.author, entry.author);
        assert_eq!(updated.published, entry.published);
        assert_eq!(updated.created, entry.created);
        assert!(!updated.read);
    }

    #[tokio::test]
    async fn test_ensure_channel_entry_is_idempotent() {
        let db = test_db().await;
        let channel = db
            .insert_channel("https://example.com/rss", "Example", None)
            .await
            .unwrap();
        let entry = db
            .create_entry(&new_entry(Some("g1"), "https://example.com/1"))
            .await
            .unwrap();

        assert!(db.ensure_channel_entry(channel, entry.id).await.unwrap());
        assert!(!db.ensure_channel_entry(channel, entry.id).await.unwrap());

        assert_eq!(db.channel_ids_for_entry(entry.id).await.unwrap(), vec![channel]);
        let entries = db.list_entries_for_channel(channel).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, entry.id);
    }

    #[tokio::test]
    async fn test_ensure_channel_entry_unknown_channel_fails() {
        let db = test_db().await;
        let entry = db
            .create_entry(&new_entry(Some("g1"), "https://example.com/1"))
            .await
            .unwrap();

        // Foreign keys are enforced
        assert!(db.ensure_channel_entry(4242, entry.id).await.is_err());
    }
}
