//! Feed retrieval and decoding.
//!
//! - [`parser`] - RSS/Atom/JSON Feed decoding into [`NormalizedFeed`] via `feed-rs`
//! - [`fetcher`] - HTTP retrieval with timeout, size limit, retry and cancellation
//!
//! # Example
//!
//! ```ignore
//! use feedgather::feed::FeedFetcher;
//!
//! let fetcher = FeedFetcher::new(&config.fetcher)?;
//! let feed = fetcher.fetch("https://example.com/rss.xml", &shutdown).await?;
//! for item in &feed.items {
//!     println!("{} by {}", item.title, item.author_line());
//! }
//! ```

mod fetcher;
mod parser;

pub use fetcher::{FeedError, FeedFetcher, FetchError};
pub use parser::{format_authors, parse_feed, Author, NormalizedFeed, NormalizedItem, ParseError};
