use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; citetrack/0.1; +https://arxiv.org)";

/// How often and how patiently a request is retried.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each attempt after that.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Backoff slept after the failed attempt `attempt` (0-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempts run out.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    what: &str,
    mut op: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                warn!(
                    attempt = attempt + 1,
                    max = attempts,
                    error = %e,
                    "{what} failed, retrying"
                );
                thread::sleep(policy.delay_after(attempt));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Blocking HTTP client shared by the source clients.
pub struct HttpClient {
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        let cfg = ureq::Agent::config_builder()
            .timeout_connect(Some(Duration::from_secs(10)))
            .timeout_global(Some(timeout))
            .build();
        HttpClient {
            agent: ureq::Agent::new_with_config(cfg),
            retry,
        }
    }

    /// GET `url` and return the body. Non-2xx statuses are errors.
    pub fn get_text(&self, url: &Url) -> Result<String, FetchError> {
        let label = redacted(url);
        with_retry(&self.retry, &label, || {
            debug!(url = %label, "GET");
            let body = self
                .agent
                .get(url.as_str())
                .header("User-Agent", USER_AGENT)
                .call()?
                .body_mut()
                .read_to_string()?;
            Ok(body)
        })
    }

    pub fn get_json(&self, url: &Url) -> Result<serde_json::Value, FetchError> {
        let body = self.get_text(url)?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

/// Host and path only, so API keys in the query never reach the logs.
fn redacted(url: &Url) -> String {
    format!("{}{}", url.host_str().unwrap_or_default(), url.path())
}
