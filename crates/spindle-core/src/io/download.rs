//! Asset downloads with a timeout and bounded retries.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;

use crate::config::Config;

/// Initial delay between attempts; doubled after each failure.
const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Shared HTTP client for asset downloads. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    retries: u32,
    backoff: Duration,
}

impl Fetcher {
    /// Build a fetcher from the run configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.fetch_timeout())
            .build()?;

        Ok(Self {
            client,
            retries: config.fetch_retries,
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Override the initial retry delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Download the full body of `url`.
    ///
    /// Timeouts, connection failures and 5xx responses are retried up to the
    /// configured count with exponential backoff; any other failure returns
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-transient error.
    pub async fn fetch(&self, url: &str) -> Result<Bytes, reqwest::Error> {
        let mut delay = self.backoff;
        let mut attempt = 0;

        loop {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.retries && is_transient(&e) => {
                    attempt += 1;
                    tracing::debug!(url, attempt, error = %e, "retrying download");
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<Bytes, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await
    }
}

/// Doubled backoff, pinned at `Duration::MAX` instead of overflowing.
fn next_delay(delay: Duration) -> Duration {
    delay.saturating_mul(2)
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
}
