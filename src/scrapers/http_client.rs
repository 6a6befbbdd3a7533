//! HTTP client for the portal with politeness throttling and retry.
//!
//! The portal is rate-sensitive and stateful, so every call flows through
//! one client that enforces a minimum delay between consecutive requests
//! and wraps each request in a bounded exponential-backoff retry. Cookies
//! stay enabled: the server keys its view state to the session.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, ScrapeError};

/// Browser-like user agent; the portal rejects obvious bot agents.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Retry budget applied to every portal request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Backoff before the second attempt; doubles each retry.
    pub base_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_backoff: Duration::from_secs(4),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given retry (1-based over completed attempts).
    pub fn backoff_for(&self, completed_attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(completed_attempts.saturating_sub(1));
        (self.base_backoff * factor).min(self.max_backoff)
    }
}

/// Shared portal HTTP client.
pub struct PortalClient {
    client: Client,
    request_delay: Duration,
    retry: RetryPolicy,
    last_request: Mutex<Option<Instant>>,
}

impl PortalClient {
    pub fn new(timeout: Duration, request_delay: Duration, retry: RetryPolicy) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            request_delay,
            retry,
            last_request: Mutex::new(None),
        }
    }

    /// Enforce the politeness delay since the previous request.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.request_delay {
                let wait = self.request_delay - elapsed;
                debug!("throttling portal request for {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// GET a page and return its body text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.send_with_retry(|| self.client.get(url)).await
    }

    /// POST a form body and return the response text.
    pub async fn post_form(&self, url: &str, form: &BTreeMap<String, String>) -> Result<String> {
        self.send_with_retry(|| self.client.post(url).form(form))
            .await
    }

    /// Run one logical request through the throttle and retry wrapper.
    ///
    /// Connection errors, timeouts, and non-2xx statuses all map to
    /// `ScrapeError::Transport`; the last error surfaces once the attempt
    /// budget is exhausted.
    async fn send_with_retry<F>(&self, make_request: F) -> Result<String>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry.attempts {
            self.throttle().await;

            let outcome: Result<()> = match make_request().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.text().await {
                            Ok(body) => return Ok(body),
                            Err(err) => Err(ScrapeError::Transport(format!(
                                "failed reading response body: {}",
                                err
                            ))),
                        }
                    } else {
                        Err(ScrapeError::Transport(format!("HTTP {}", status)))
                    }
                }
                Err(err) => Err(ScrapeError::Transport(err.to_string())),
            };

            if let Err(err) = outcome {
                warn!(
                    "portal request attempt {}/{} failed: {}",
                    attempt, self.retry.attempts, err
                );
                last_error = Some(err);
                if attempt < self.retry.attempts {
                    tokio::time::sleep(self.retry.backoff_for(attempt)).await;
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ScrapeError::Transport("retry budget exhausted".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let retry = RetryPolicy {
            attempts: 5,
            base_backoff: Duration::from_secs(4),
            max_backoff: Duration::from_secs(10),
        };
        assert_eq!(retry.backoff_for(1), Duration::from_secs(4));
        assert_eq!(retry.backoff_for(2), Duration::from_secs(8));
        assert_eq!(retry.backoff_for(3), Duration::from_secs(10));
        assert_eq!(retry.backoff_for(4), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn throttle_enforces_minimum_spacing() {
        let client = PortalClient::new(
            Duration::from_secs(5),
            Duration::from_millis(50),
            RetryPolicy::default(),
        );

        let start = Instant::now();
        client.throttle().await;
        client.throttle().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn first_request_is_not_delayed() {
        let client = PortalClient::new(
            Duration::from_secs(5),
            Duration::from_secs(2),
            RetryPolicy::default(),
        );

        let start = Instant::now();
        client.throttle().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn unreachable_host_exhausts_retries_as_transport_error() {
        let client = PortalClient::new(
            Duration::from_millis(200),
            Duration::ZERO,
            RetryPolicy {
                attempts: 2,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
        );

        let result = client.get_text("http://127.0.0.1:1/unreachable").await;
        assert!(matches!(result, Err(ScrapeError::Transport(_))));
    }
}
