//! Shared HTTP plumbing for provider shims.
//!
//! Wraps a blocking `reqwest` client with retry, exponential backoff and a
//! circuit breaker. Status handling:
//! - 403 trips the breaker immediately (treated as an IP ban)
//! - 429 and 5xx count as breaker failures and are retried
//! - 401 fails at once with `AuthenticationRequired`
//! - other 4xx fail at once

use crate::config::HttpSettings;
use crate::data::{CircuitBreaker, ProviderError};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

pub struct HttpShim {
    client: Client,
    breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpShim {
    pub fn new(settings: &HttpSettings, breaker: Arc<CircuitBreaker>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            breaker,
            max_retries: settings.max_retries,
            base_delay: settings.base_delay(),
        })
    }

    /// Fresh breaker configured from `settings`.
    pub fn breaker_from(settings: &HttpSettings) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            settings.breaker_cooldown(),
            settings.breaker_failure_threshold,
        ))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }

    /// Send the request built by `build`, retrying transient failures, and
    /// return the response body.
    ///
    /// `what` names the request in errors and logs.
    pub fn get_text<F>(&self, what: &str, build: F) -> Result<String, ProviderError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.get_text_with(what, build, default_client_error)
    }

    /// Like [`get_text`](Self::get_text), with a provider-specific mapping
    /// for non-retryable 4xx responses (status, body) into an error.
    pub fn get_text_with<F, E>(&self, what: &str, build: F, on_client_error: E) -> Result<String, ProviderError>
    where
        F: Fn(&Client) -> RequestBuilder,
        E: Fn(StatusCode, &str) -> ProviderError,
    {
        let resp = self.send(what, build, on_client_error)?;
        resp.text()
            .map_err(|e| ProviderError::ResponseFormatChanged(format!("read body for {what}: {e}")))
    }

    fn send<F, E>(&self, what: &str, build: F, on_client_error: E) -> Result<Response, ProviderError>
    where
        F: Fn(&Client) -> RequestBuilder,
        E: Fn(StatusCode, &str) -> ProviderError,
    {
        if !self.breaker.is_allowed() {
            return Err(ProviderError::CircuitBreakerTripped);
        }

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, %what, "retrying request");
                std::thread::sleep(delay);
            }

            if !self.breaker.is_allowed() {
                return Err(ProviderError::CircuitBreakerTripped);
            }

            match build(&self.client).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::FORBIDDEN {
                        warn!(%what, "HTTP 403, tripping circuit breaker");
                        self.breaker.trip();
                        return Err(ProviderError::CircuitBreakerTripped);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        self.breaker.record_failure();
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        warn!(%what, retry_after_secs = retry_after, "rate limited");
                        last_error = Some(ProviderError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status == StatusCode::UNAUTHORIZED {
                        return Err(ProviderError::AuthenticationRequired(format!(
                            "HTTP 401 for {what}"
                        )));
                    }

                    if status.is_server_error() {
                        self.breaker.record_failure();
                        last_error = Some(ProviderError::Other(format!("HTTP {status} for {what}")));
                        continue;
                    }

                    if !status.is_success() {
                        let body = resp.text().unwrap_or_default();
                        debug!(%what, %status, "client error");
                        return Err(on_client_error(status, &body));
                    }

                    self.breaker.record_success();
                    return Ok(resp);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(ProviderError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(ProviderError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Other("max retries exceeded".into())))
    }
}

fn default_client_error(status: StatusCode, body: &str) -> ProviderError {
    let snippet: String = body.chars().take(200).collect();
    ProviderError::Other(format!("HTTP {status}: {snippet}"))
}
