//! Periodic feed collector.
//!
//! Enumerates enabled channels from SQLite, fetches and parses each feed with
//! a bounded worker pool, merges items into deduplicated entries and records a
//! fetch log per successfully processed channel.

pub mod config;
pub mod feed;
pub mod ingest;
pub mod storage;
