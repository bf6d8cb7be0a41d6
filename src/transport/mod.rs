//! Retrying HTTP transport for upstream calls.
//!
//! One pooled [`reqwest::Client`] per provider, with connect/read/request
//! timeouts and a bounded exponential-backoff retry loop. For streaming
//! requests the retry window covers only the initial exchange; once the
//! response head is returned to the caller, body errors surface on the
//! stream's error channel without retry.

use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::GatewayError;

/// Retry policy for one upstream.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Apply ±25% uniform jitter to each backoff sleep.
    pub jitter: bool,
    /// HTTP statuses that warrant a retry.
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
            retry_statuses: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// Whether `status` is in the retryable set.
    pub fn should_retry(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status.as_u16())
    }

    /// Backoff before retry number `attempt` (0-based), capped and jittered.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = exp.min(self.max_backoff.as_secs_f64());
        let secs = if self.jitter {
            capped * rand::rng().random_range(0.75..=1.25)
        } else {
            capped
        };
        Duration::from_secs_f64(secs)
    }
}

/// Connection-pool and timeout knobs for one upstream.
#[derive(Debug, Clone)]
pub struct CallerConfig {
    pub connect_timeout: Duration,
    /// Idle gap allowed between body bytes; also bounds streamed reads.
    pub read_timeout: Duration,
    /// Overall deadline for non-streaming exchanges.
    pub request_timeout: Duration,
    pub max_idle_conns_per_host: usize,
    pub idle_conn_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for CallerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(120),
            max_idle_conns_per_host: 32,
            idle_conn_timeout: Duration::from_secs(90),
            retry: RetryConfig::default(),
        }
    }
}

/// Pooled, retrying HTTP caller.
#[derive(Debug, Clone)]
pub struct HttpCaller {
    client: reqwest::Client,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl HttpCaller {
    /// Builds the pooled client for `config`.
    pub fn new(config: &CallerConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_max_idle_per_host(config.max_idle_conns_per_host)
            .pool_idle_timeout(config.idle_conn_timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            retry: config.retry.clone(),
            request_timeout: config.request_timeout,
        })
    }

    /// POSTs `body` to `url`, retrying retryable statuses and connection
    /// errors with exponential backoff. Returns the response head as soon
    /// as it is successful; for `streaming` calls no overall deadline is
    /// applied so the body can outlive `request_timeout`.
    pub async fn post(
        &self,
        cancel: &CancellationToken,
        url: &str,
        body: Bytes,
        headers: HeaderMap,
        streaming: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }

            let mut request = self
                .client
                .post(url)
                .headers(headers.clone())
                .body(body.clone());
            if streaming {
                request = request.header(reqwest::header::ACCEPT, "text/event-stream");
            } else {
                request = request.timeout(self.request_timeout);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                outcome = request.send() => outcome,
            };

            match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if self.retry.should_retry(status) && attempt < self.retry.max_retries {
                        debug!(%url, %status, attempt, "retrying upstream call");
                        self.sleep_before_retry(cancel, attempt).await?;
                        attempt += 1;
                        continue;
                    }
                    let message = response.text().await.unwrap_or_default();
                    return Err(upstream_failure(status, message));
                }
                Err(error) => {
                    let transient = error.is_connect() || error.is_timeout();
                    if transient && attempt < self.retry.max_retries {
                        warn!(%url, %error, attempt, "upstream connection error, retrying");
                        self.sleep_before_retry(cancel, attempt).await?;
                        attempt += 1;
                        continue;
                    }
                    return Err(GatewayError::Upstream {
                        status: error.status().map(|s| s.as_u16()),
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    async fn sleep_before_retry(
        &self,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> Result<(), GatewayError> {
        let delay = self.retry.backoff_delay(attempt);
        tokio::select! {
            _ = cancel.cancelled() => Err(GatewayError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

fn upstream_failure(status: StatusCode, message: String) -> GatewayError {
    let message = if message.is_empty() {
        format!("upstream returned {status}")
    } else {
        message
    };
    if status == StatusCode::TOO_MANY_REQUESTS {
        GatewayError::RateLimited(message)
    } else {
        GatewayError::Upstream {
            status: Some(status.as_u16()),
            message,
        }
    }
}
