//! SQLite-backed feed store.
//!
//! Holds channels, merged entries, the channel/entry association table and
//! the per-channel fetch log. Ingestion reads channels and owns every write to
//! entries, associations and the log.

mod channels;
mod entries;
mod fetch_log;
mod schema;
mod types;

pub use schema::Database;
pub use types::{Channel, Entry, FetchLog, NewEntry, StoreError};
