use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Store errors raised by lookups, inserts, updates and associations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file is held by another writer past the busy timeout
    #[error("Database is locked by another process")]
    Locked,

    /// Schema setup failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Query(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, mapping SQLite lock conditions to [`StoreError::Locked`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StoreError::Locked;
        }

        StoreError::Query(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed feed source.
///
/// Channels are owned by the management side of the store; ingestion only
/// reads them.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Channel {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Feed URL, the fetch target
    pub link: String,
    pub host: Option<String>,
    pub enabled: bool,
}

/// One syndicated item merged from one or more channels.
///
/// `read` and `deleted` belong to the management API and are never written
/// by ingestion. `created`/`updated` are unix timestamps set by the store.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Entry {
    pub id: i64,
    pub guid: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub link: String,
    pub author: String,
    pub published: Option<i64>,
    pub read: bool,
    pub deleted: bool,
    pub created: i64,
    pub updated: i64,
}

/// Content fields for a new [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    /// `None` when the source did not provide a usable guid
    pub guid: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub link: String,
    pub author: String,
    pub published: Option<i64>,
}

/// A row of the append-only per-channel fetch log
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FetchLog {
    pub id: i64,
    pub channel_id: i64,
    pub created: i64,
}
