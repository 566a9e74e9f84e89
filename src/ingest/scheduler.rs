use crate::config::{GathererConfig, ItemFailurePolicy};
use crate::feed::{FeedError, FeedFetcher};
use crate::ingest::merge::{process_item, MergeOutcome};
use crate::ingest::Shutdown;
use crate::storage::{Channel, Database, StoreError};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;

/// Number of channels processed concurrently within one pass
pub const WORKER_COUNT: usize = 10;

/// Why one channel was skipped for the current pass.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    /// Store failure outside of a single item (fetch log), or an item
    /// failure under [`ItemFailurePolicy::AbortChannel`]
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Channel processing cancelled by shutdown")]
    Cancelled,
}

/// Per-channel item counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl ChannelReport {
    fn record(&mut self, outcome: &MergeOutcome) {
        match outcome {
            MergeOutcome::Created { .. } => self.created += 1,
            MergeOutcome::Updated { .. } => self.updated += 1,
            MergeOutcome::Unchanged { .. } => self.unchanged += 1,
        }
    }
}

/// Result of one pass over all enabled channels.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub channels: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Item counts summed over the channels that succeeded
    pub items: ChannelReport,
}

/// Periodic ingestion over every enabled channel.
#[derive(Clone)]
pub struct Scheduler {
    db: Database,
    fetcher: FeedFetcher,
    interval: Duration,
    item_failure_policy: ItemFailurePolicy,
}

impl Scheduler {
    pub fn new(db: Database, fetcher: FeedFetcher, config: &GathererConfig) -> Self {
        Self {
            db,
            fetcher,
            interval: config.interval(),
            item_failure_policy: config.item_failure_policy,
        }
    }

    /// Run passes until `shutdown` fires.
    ///
    /// The first pass starts immediately, then one per interval. A pass is
    /// never interrupted from outside: shutdown is observed by the pass itself
    /// and `run` returns once it has drained.
    pub async fn run(&self, shutdown: Shutdown) {
        let mut stop = shutdown.clone();
        let mut ticker = tokio::time::interval(self.interval);
        // A pass longer than the interval delays the next one instead of bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            workers = WORKER_COUNT,
            "Gatherer started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.perform_one_pass(&shutdown).await;
                }
                _ = stop.cancelled() => break,
            }

            if shutdown.is_cancelled() {
                break;
            }
        }

        tracing::info!("Gatherer stopped");
    }

    /// Fetch and merge every enabled channel once, at most [`WORKER_COUNT`]
    /// at a time.
    ///
    /// Channel failures are logged and counted; they never abort the pass.
    /// Each channel's writes are committed as they happen.
    pub async fn perform_one_pass(&self, shutdown: &Shutdown) -> PassReport {
        let channels = match self.db.list_enabled_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list enabled channels, skipping pass");
                return PassReport::default();
            }
        };

        let total = channels.len();
        tracing::info!(channels = total, "Starting ingestion pass");

        // Channels are pulled lazily, so at most WORKER_COUNT are in flight
        let results: Vec<Result<ChannelReport, ChannelError>> = stream::iter(channels)
            .map(|channel| async move {
                if shutdown.is_cancelled() {
                    return Err(ChannelError::Cancelled);
                }

                let result = self.process_channel(&channel, shutdown).await;
                if let Err(e) = &result {
                    tracing::error!(
                        channel_id = channel.id,
                        link = %channel.link,
                        timeout = matches!(e, ChannelError::Feed(FeedError::Fetch(f)) if f.is_timeout()),
                        error = %e,
                        "Channel processing failed"
                    );
                }
                result
            })
            .buffer_unordered(WORKER_COUNT)
            .collect()
            .await;

        let mut report = PassReport {
            channels: total,
            ..PassReport::default()
        };
        for result in results {
            match result {
                Ok(items) => {
                    report.succeeded += 1;
                    report.items.created += items.created;
                    report.items.updated += items.updated;
                    report.items.unchanged += items.unchanged;
                    report.items.failed += items.failed;
                }
                Err(_) => report.failed += 1,
            }
        }

        tracing::info!(
            channels = report.channels,
            succeeded = report.succeeded,
            failed = report.failed,
            created = report.items.created,
            updated = report.items.updated,
            "Ingestion pass finished"
        );
        report
    }

    /// Fetch one channel, merge its items in feed order, then log the fetch.
    ///
    /// Under [`ItemFailurePolicy::Continue`] a failed item is logged and
    /// skipped; under [`ItemFailurePolicy::AbortChannel`] it ends the channel
    /// without a fetch-log row.
    pub async fn process_channel(
        &self,
        channel: &Channel,
        shutdown: &Shutdown,
    ) -> Result<ChannelReport, ChannelError> {
        let feed = self.fetcher.fetch(&channel.link, shutdown).await?;

        tracing::debug!(
            channel_id = channel.id,
            items = feed.items.len(),
            "Fetched channel feed"
        );

        let mut report = ChannelReport::default();
        for item in &feed.items {
            if shutdown.is_cancelled() {
                return Err(ChannelError::Cancelled);
            }

            match process_item(&self.db, channel.id, item).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    tracing::error!(
                        channel_id = channel.id,
                        link = %channel.link,
                        item = %item.title,
                        error = %e,
                        "Failed to process feed item"
                    );
                    match self.item_failure_policy {
                        ItemFailurePolicy::Continue => report.failed += 1,
                        ItemFailurePolicy::AbortChannel => return Err(e.into()),
                    }
                }
            }
        }

        self.db.append_fetch_log(channel.id).await?;
        Ok(report)
    }
}
