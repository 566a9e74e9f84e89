//! Periodic ingestion: scheduling passes, merging items, cooperative shutdown.
//!
//! A pass lists every enabled channel and hands them to a bounded pool of
//! [`WORKER_COUNT`] concurrent workers. Each worker fetches one channel and
//! merges its items in feed order through [`process_item`].

mod merge;
mod scheduler;
mod shutdown;

pub use merge::{changed_field, process_item, ChangedField, MergeOutcome};
pub use scheduler::{ChannelError, ChannelReport, PassReport, Scheduler, WORKER_COUNT};
pub use shutdown::{Shutdown, ShutdownHandle};
