//! Authenticated HTTP with retry on transient failures.
//!
//! [`RetryingClient`] sends bearer-authenticated requests relative to a base
//! URL. Responses with status 429 or 5xx, and transport failures, are
//! retried up to `max_retries` times with a delay of
//! `base_delay * 2^attempt`, stretched to the server's `Retry-After` (in
//! seconds, capped at `max_retry_after`) when one is sent. The final response
//! is always handed back to the caller, which decides what its status means.

use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Longest server-requested wait honored between retries.
pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Builder for [`RetryingClient`].
#[derive(Debug, Clone)]
pub struct RetryingClientBuilder {
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    base_delay: Duration,
    max_retry_after: Duration,
    user_agent: Option<String>,
}

impl RetryingClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of retries after the initial attempt.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Upper bound on a `Retry-After` wait.
    pub fn max_retry_after(mut self, limit: Duration) -> Self {
        self.max_retry_after = limit;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> ProviderResult<RetryingClient> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }
        let http = builder.build().map_err(|e| {
            ProviderError::configuration("failed to create HTTP client").with_source(e)
        })?;

        Ok(RetryingClient {
            http,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            max_retries: self.max_retries,
            base_delay: self.base_delay,
            max_retry_after: self.max_retry_after,
        })
    }
}

/// HTTP client with bearer authentication and exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryingClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
    max_retry_after: Duration,
}

impl RetryingClient {
    /// Starts building a client for the API rooted at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> RetryingClientBuilder {
        RetryingClientBuilder {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
            user_agent: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    /// Delay before retry number `attempt`, never shorter than the backoff
    /// and never longer than `max_retry_after` when the server asked to wait.
    pub fn retry_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff_delay(attempt);
        match retry_after {
            Some(wait) => wait.min(self.max_retry_after).max(backoff),
            None => backoff,
        }
    }

    /// Issues `method path` with the given query parameters and JSON body.
    ///
    /// Returns the last response received, whatever its status. Only a
    /// transport failure on the final attempt becomes an error.
    pub async fn request(
        &self,
        token: &str,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> ProviderResult<Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(token)
                .query(params);
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(attempt, %method, %url, "sending request");
            let retries_left = attempt < self.max_retries;

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if is_transient(status) && retries_left {
                        let delay = self.retry_delay(attempt, retry_after(&response));
                        warn!(
                            attempt,
                            %status,
                            delay_ms = delay.as_millis() as u64,
                            %url,
                            "transient HTTP status, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    debug!(attempt, %status, %url, "received response");
                    return Ok(response);
                }
                Err(e) if retries_left && (e.is_timeout() || e.is_connect() || e.is_request()) => {
                    let delay = self.backoff_delay(attempt);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    let message = if e.is_timeout() {
                        "request timeout".to_string()
                    } else if e.is_connect() {
                        format!("connection failed: {}", e)
                    } else {
                        format!("request failed: {}", e)
                    };
                    return Err(ProviderError::network(message).with_source(e));
                }
            }
        }
    }
}

/// 429 and 5xx are worth retrying.
pub fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `Retry-After` in its delay-seconds form; HTTP dates are ignored.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}

/// Turns a non-success response into a classified [`ProviderError`].
pub async fn error_for_status(response: Response) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = response.text().await.unwrap_or_default();
    let mut err = ProviderError::from_status(status.as_u16(), body);
    if let Some(secs) = retry_after {
        err = ProviderError::new(err.code(), format!("{} (retry after {}s)", err.message(), secs))
            .with_status(status.as_u16());
    }
    Err(err)
}
