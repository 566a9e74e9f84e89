use crate::config::FetcherConfig;
use crate::feed::parser::{parse_feed, NormalizedFeed, ParseError};
use crate::ingest::Shutdown;
use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

/// Longest sleep between two retries of one fetch.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Errors raised while retrieving a feed body.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request (including body read) exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Shutdown was requested while the request was in flight
    #[error("Request cancelled by shutdown")]
    Cancelled,
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        match self {
            FetchError::Timeout(_) => true,
            FetchError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Fetch or parse failure for one feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// HTTP capability used by ingestion.
///
/// Wraps one pooled `reqwest::Client` built from [`FetcherConfig`]; clones
/// share the pool.
#[derive(Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
    max_feed_size: usize,
}

impl FeedFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(create_redirect_policy())
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Use a caller-supplied client, keeping the limits from `config`.
    pub fn with_client(client: reqwest::Client, config: &FetcherConfig) -> Self {
        Self {
            client,
            timeout: config.timeout(),
            max_retries: config.max_retries,
            max_feed_size: config.max_feed_size,
        }
    }

    /// GET `url` and decode it into a [`NormalizedFeed`].
    ///
    /// # Errors
    ///
    /// - [`FetchError::Timeout`] - send plus body read exceeded the timeout
    /// - [`FetchError::HttpStatus`] - non-2xx response (after retries for 5xx)
    /// - [`FetchError::RateLimited`] - 429 after max retries
    /// - [`FetchError::Network`] - connection or TLS errors
    /// - [`FetchError::ResponseTooLarge`] - body exceeded the size limit
    /// - [`FetchError::Cancelled`] - shutdown fired mid-request
    /// - [`FeedError::Parse`] - body is not RSS, Atom or JSON Feed
    ///
    /// # Retries
    ///
    /// With `max_retries = 0` (the default) every failure is final until the
    /// next scheduled pass. Otherwise 429, 5xx and truncated bodies back off
    /// exponentially starting at 500ms.
    pub async fn fetch(&self, url: &str, shutdown: &Shutdown) -> Result<NormalizedFeed, FeedError> {
        let mut retry_count = 0;

        let bytes = loop {
            let err = match self.attempt(url, shutdown).await {
                Ok(bytes) => break bytes,
                Err(e) => e,
            };

            let retryable = match &err {
                FetchError::HttpStatus(429) | FetchError::IncompleteResponse { .. } => true,
                FetchError::HttpStatus(status) => *status >= 500,
                _ => false,
            };
            if !retryable {
                return Err(err.into());
            }
            if retry_count >= self.max_retries {
                return Err(match err {
                    FetchError::HttpStatus(429) if self.max_retries > 0 => {
                        FetchError::RateLimited(self.max_retries)
                    }
                    other => other,
                }
                .into());
            }

            let delay = backoff_delay(retry_count);
            tracing::warn!(
                feed = %url,
                error = %err,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Feed fetch failed, retrying after delay"
            );

            let mut shutdown = shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Err(FetchError::Cancelled.into()),
            }
            retry_count += 1;
        };

        let feed = parse_feed(&bytes)?;
        Ok(feed)
    }

    /// One GET with the hard timeout applied to send and body read together.
    async fn attempt(&self, url: &str, shutdown: &Shutdown) -> Result<Vec<u8>, FetchError> {
        let mut shutdown = shutdown.clone();
        tokio::select! {
            result = tokio::time::timeout(self.timeout, self.send_and_read(url)) => {
                result.unwrap_or_else(|_| Err(FetchError::Timeout(self.timeout)))
            }
            _ = shutdown.cancelled() => Err(FetchError::Cancelled),
        }
    }

    async fn send_and_read(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, self.max_feed_size).await
    }
}

/// 0.5s, 1s, 2s, ... capped at [`MAX_BACKOFF`].
fn backoff_delay(retry_count: u32) -> Duration {
    let millis = 2u64
        .checked_pow(retry_count)
        .map_or(u64::MAX, |factor| factor.saturating_mul(500));
    Duration::from_millis(millis).min(MAX_BACKOFF)
}

/// At most 3 redirects, no loops.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        // `previous` includes the original request
        if attempt.previous().len() > 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
