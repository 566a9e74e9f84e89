//! Dedup and change detection for one fetched item.

use crate::feed::NormalizedItem;
use crate::storage::{Database, Entry, NewEntry, StoreError};

/// What [`process_item`] did with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No existing entry matched; a new one was inserted
    Created { entry_id: i64 },
    /// An existing entry matched and its title/description/link were rewritten
    Updated { entry_id: i64, field: ChangedField },
    /// An existing entry matched with identical content
    Unchanged { entry_id: i64 },
}

impl MergeOutcome {
    pub fn entry_id(&self) -> i64 {
        match *self {
            MergeOutcome::Created { entry_id }
            | MergeOutcome::Updated { entry_id, .. }
            | MergeOutcome::Unchanged { entry_id } => entry_id,
        }
    }
}

/// The first content field found to differ, in comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangedField {
    Title,
    Description,
    Link,
}

impl std::fmt::Display for ChangedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ChangedField::Title => "title",
            ChangedField::Description => "description",
            ChangedField::Link => "link",
        })
    }
}

/// Merge one fetched item into the store and associate it with `channel_id`.
///
/// Lookup is by guid first (when non-empty), then by link. A match is
/// compared on title, description and link only; author and published never
/// trigger a write. The channel association is ensured on every path and is
/// a no-op when it already exists.
///
/// # Errors
///
/// Any store failure aborts this item. Nothing is rolled back: an entry
/// created before a failed association stays and is associated on the next
/// pass.
pub async fn process_item(
    db: &Database,
    channel_id: i64,
    item: &NormalizedItem,
) -> Result<MergeOutcome, StoreError> {
    let outcome = match find_existing(db, item).await? {
        None => {
            let entry = db.create_entry(&new_entry(item)).await?;
            tracing::debug!(
                channel_id = channel_id,
                entry_id = entry.id,
                title = %entry.title,
                "Created entry"
            );
            MergeOutcome::Created { entry_id: entry.id }
        }
        Some(existing) => match changed_field(&existing, item) {
            None => MergeOutcome::Unchanged {
                entry_id: existing.id,
            },
            Some(field) => {
                log_change(db, &existing, item, field).await;
                db.update_entry_short(
                    existing.id,
                    &item.title,
                    item.description.as_deref(),
                    &item.link,
                )
                .await?;
                MergeOutcome::Updated {
                    entry_id: existing.id,
                    field,
                }
            }
        },
    };

    db.ensure_channel_entry(channel_id, outcome.entry_id())
        .await?;

    Ok(outcome)
}

async fn find_existing(db: &Database, item: &NormalizedItem) -> Result<Option<Entry>, StoreError> {
    if let Some(guid) = item.guid.as_deref().filter(|g| !g.is_empty()) {
        if let Some(entry) = db.find_entry_by_guid(guid).await? {
            return Ok(Some(entry));
        }
    }

    db.find_entry_by_link(&item.link).await
}

/// Compare title, description, link in that order; first difference wins.
///
/// A missing description equals an empty one.
pub fn changed_field(stored: &Entry, item: &NormalizedItem) -> Option<ChangedField> {
    if stored.title != item.title {
        return Some(ChangedField::Title);
    }
    if stored.description.as_deref().unwrap_or_default()
        != item.description.as_deref().unwrap_or_default()
    {
        return Some(ChangedField::Description);
    }
    if stored.link != item.link {
        return Some(ChangedField::Link);
    }
    None
}

fn new_entry(item: &NormalizedItem) -> NewEntry {
    NewEntry {
        guid: item.guid.clone().filter(|g| !g.is_empty()),
        title: item.title.clone(),
        description: item.description.clone(),
        link: item.link.clone(),
        author: item.author_line(),
        published: item.published.map(|p| p.timestamp()),
    }
}

async fn log_change(db: &Database, stored: &Entry, item: &NormalizedItem, field: ChangedField) {
    let (old, new) = match field {
        ChangedField::Title => (stored.title.as_str(), item.title.as_str()),
        ChangedField::Description => (
            stored.description.as_deref().unwrap_or_default(),
            item.description.as_deref().unwrap_or_default(),
        ),
        ChangedField::Link => (stored.link.as_str(), item.link.as_str()),
    };

    // Informational only; a failed lookup must not block the update
    let channels = match db.channel_ids_for_entry(stored.id).await {
        Ok(ids) => ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(","),
        Err(e) => {
            tracing::warn!(entry_id = stored.id, error = %e, "Failed to load channels for entry");
            String::new()
        }
    };

    tracing::info!(
        entry_id = stored.id,
        channels = %channels,
        field = %field,
        old = %old,
        new = %new,
        "Entry content changed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Author;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    async fn test_channel(db: &Database, n: u32) -> i64 {
        db.insert_channel(&format!("https://feed{n}.example.com/rss"), "Feed", None)
            .await
            .unwrap()
    }

    fn item(guid: Option<&str>, title: &str, link: &str) -> NormalizedItem {
        NormalizedItem {
            guid: guid.map(str::to_owned),
            title: title.to_string(),
            description: Some("Body".to_string()),
            link: link.to_string(),
            authors: vec![Author {
                name: "Jane".to_string(),
                email: Some("jane@example.com".to_string()),
            }],
            published: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_new_item_is_created_and_associated() {
        let db = test_db().await;
        let channel = test_channel(&db, 1).await;

        let outcome = process_item(&db, channel, &item(Some("g1"), "A", "http://x/1"))
            .await
            .unwrap();

        let MergeOutcome::Created { entry_id } = outcome else {
            panic!("Expected Created, got {:?}", outcome);
        };
        let entry = db.get_entry(entry_id).await.unwrap().unwrap();
        assert_eq!(entry.guid.as_deref(), Some("g1"));
        assert_eq!(entry.title, "A");
        assert_eq!(entry.description.as_deref(), Some("Body"));
        assert_eq!(entry.link, "http://x/1");
        assert_eq!(entry.author, "Jane (jane@example.com)");
        assert_eq!(entry.published, Some(1704067200));
        assert!(!entry.read);
        assert!(!entry.deleted);
        assert_eq!(db.channel_ids_for_entry(entry_id).await.unwrap(), vec![channel]);
    }

    #[tokio::test]
    async fn test_identical_item_twice_is_idempotent() {
        let db = test_db().await;
        let channel = test_channel(&db, 1).await;
        let it = item(Some("g1"), "A", "http://x/1");

        let first = process_item(&db, channel, &it).await.unwrap();
        let second = process_item(&db, channel, &it).await.unwrap();

        assert_eq!(
            second,
            MergeOutcome::Unchanged {
                entry_id: first.entry_id()
            }
        );
        assert_eq!(db.count_entries().await.unwrap(), 1);
        assert_eq!(db.list_entries_for_channel(channel).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_guid_match_wins_over_different_link() {
        let db = test_db().await;
        let channel = test_channel(&db, 1).await;

        let first = process_item(&db, channel, &item(Some("g1"), "A", "http://x/1"))
            .await
            .unwrap();
        let second = process_item(&db, channel, &item(Some("g1"), "A", "http://x/moved"))
            .await
            .unwrap();

        assert_eq!(
            second,
            MergeOutcome::Updated {
                entry_id: first.entry_id(),
                field: ChangedField::Link
            }
        );
        assert_eq!(db.count_entries().await.unwrap(), 1);
        let entry = db.get_entry(first.entry_id()).await.unwrap().unwrap();
        assert_eq!(entry.link, "http://x/moved");
    }

    #[tokio::test]
    async fn test_unknown_guid_falls_back_to_link() {
        let db = test_db().await;
        let channel = test_channel(&db, 1).await;

        let first = process_item(&db, channel, &item(Some("g1"), "A", "http://x/1"))
            .await
            .unwrap();
        let second = process_item(&db, channel, &item(Some("other"), "A", "http://x/1"))
            .await
            .unwrap();

        assert_eq!(second.entry_id(), first.entry_id());
        assert_eq!(db.count_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_guid_matches_by_link_and_updates_description() {
        let db = test_db().await;
        let channel = test_channel(&db, 1).await;

        let original = item(Some(""), "A", "http://x/1");
        let first = process_item(&db, channel, &original).await.unwrap();

        let mut changed = original.clone();
        changed.description = Some("Edited body".to_string());
        let second = process_item(&db, channel, &changed).await.unwrap();

        assert_eq!(
            second,
            MergeOutcome::Updated {
                entry_id: first.entry_id(),
                field: ChangedField::Description
            }
        );
        assert_eq!(db.count_entries().await.unwrap(), 1);
        let entry = db.get_entry(first.entry_id()).await.unwrap().unwrap();
        assert_eq!(entry.guid, None);
        assert_eq!(entry.description.as_deref(), Some("Edited body"));
    }

    #[tokio::test]
    async fn test_title_change_updates_entry() {
        let db = test_db().await;
        let channel = test_channel(&db, 1).await;

        process_item(&db, channel, &item(Some("g1"), "A", "http://x/1"))
            .await
            .unwrap();
        let outcome = process_item(&db, channel, &item(Some("g1"), "A2", "http://x/1"))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            MergeOutcome::Updated {
                field: ChangedField::Title,
                ..
            }
        ));
        let entry = db.get_entry(outcome.entry_id()).await.unwrap().unwrap();
        assert_eq!(entry.title, "A2");
        assert_eq!(db.count_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_author_and_published_changes_do_not_update() {
        let db = test_db().await;
        let channel = test_channel(&db, 1).await;

        let original = item(Some("g1"), "A", "http://x/1");
        let first = process_item(&db, channel, &original).await.unwrap();
        let before = db.get_entry(first.entry_id()).await.unwrap().unwrap();

        let mut changed = original.clone();
        changed.authors = vec![Author {
            name: "Someone Else".to_string(),
            email: None,
        }];
        changed.published = Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        let second = process_item(&db, channel, &changed).await.unwrap();

        assert_eq!(
            second,
            MergeOutcome::Unchanged {
                entry_id: first.entry_id()
            }
        );
        let after = db.get_entry(first.entry_id()).await.unwrap().unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_update_keeps_author_and_published() {
        let db = test_db().await;
        let channel = test_channel(&db, 1).await;

        let original = item(Some("g1"), "A", "http://x/1");
        let first = process_item(&db, channel, &original).await.unwrap();

        let mut changed = original.clone();
        changed.title = "A2".to_string();
        changed.authors.clear();
        changed.published = None;
        process_item(&db, channel, &changed).await.unwrap();

        let entry = db.get_entry(first.entry_id()).await.unwrap().unwrap();
        assert_eq!(entry.title, "A2");
        assert_eq!(entry.author, "Jane (jane@example.com)");
        assert_eq!(entry.published, Some(1704067200));
    }

    #[tokio::test]
    async fn test_same_entry_from_two_channels() {
        let db = test_db().await;
        let a = test_channel(&db, 1).await;
        let b = test_channel(&db, 2).await;
        let it = item(Some("shared"), "Cross-post", "http://x/shared");

        let first = process_item(&db, a, &it).await.unwrap();
        let second = process_item(&db, b, &it).await.unwrap();

        assert_eq!(first.entry_id(), second.entry_id());
        assert_eq!(db.count_entries().await.unwrap(), 1);
        assert_eq!(db.channel_ids_for_entry(first.entry_id()).await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_association_failure_is_an_error() {
        let db = test_db().await;

        let result = process_item(&db, 4242, &item(Some("g1"), "A", "http://x/1")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_changed_field_order_and_empty_description() {
        let stored = Entry {
            id: 1,
            guid: Some("g1".to_string()),
            title: "A".to_string(),
            description: None,
            link: "http://x/1".to_string(),
            author: String::new(),
            published: None,
            read: false,
            deleted: false,
            created: 0,
            updated: 0,
        };

        let mut it = item(Some("g1"), "A", "http://x/1");
        it.description = Some(String::new());
        assert_eq!(changed_field(&stored, &it), None);

        it.description = Some("now set".to_string());
        it.link = "http://x/2".to_string();
        assert_eq!(changed_field(&stored, &it), Some(ChangedField::Description));

        it.title = "B".to_string();
        assert_eq!(changed_field(&stored, &it), Some(ChangedField::Title));
    }
}
