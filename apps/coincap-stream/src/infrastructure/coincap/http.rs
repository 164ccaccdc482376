//! CoinCap REST Client
//!
//! `reqwest` wrapper with retry logic for the CoinCap HTTP API. Every endpoint
//! is a plain `GET` returning JSON.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::backoff::{RetryConfig, RetryPolicy};
use crate::domain::market::{Front, Global, History, HistoryInterval, Mapping, Page};
use crate::infrastructure::config::ApiSettings;
use crate::infrastructure::metrics::{self, RequestOutcome};

/// REST errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP client could not be built.
    #[error("invalid HTTP client configuration: {0}")]
    Config(String),

    /// Request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with a non-retryable status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// Rate limited and out of retries.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Server-suggested wait.
        retry_after_secs: u64,
    },

    /// Transient failures outlasted the retry budget.
    #[error("gave up after {attempts} attempts")]
    MaxRetriesExceeded {
        /// Attempts made, including the first.
        attempts: u32,
    },

    /// Response body did not match the expected schema.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Whether the server reported the resource as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// HTTP client for the CoinCap REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    retry: RetryConfig,
}

impl ApiClient {
    /// Create a new client from settings.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the underlying HTTP client cannot be
    /// built.
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            retry: settings.retry.clone(),
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Symbols of all tracked coins.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    pub async fn coins(&self) -> Result<Vec<String>, ApiError> {
        self.get("coins").await
    }

    /// Symbols of coins listed on the exchange.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    pub async fn coins_xcp(&self) -> Result<Vec<String>, ApiError> {
        self.get("coins/xcp").await
    }

    /// Symbols of all exchange coins, including inactive ones.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    pub async fn coins_xcp_all(&self) -> Result<Vec<String>, ApiError> {
        self.get("coins/xcp/all").await
    }

    /// Symbol to name mappings.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    pub async fn map(&self) -> Result<Vec<Mapping>, ApiError> {
        self.get("map").await
    }

    /// Market-wide snapshot.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    pub async fn global(&self) -> Result<Global, ApiError> {
        self.get("global").await
    }

    /// Front page rows for all coins.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    pub async fn front(&self) -> Result<Vec<Front>, ApiError> {
        self.get("front").await
    }

    /// Front page rows for exchange coins.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    pub async fn front_xcp(&self) -> Result<Vec<Front>, ApiError> {
        self.get("front/xcp").await
    }

    /// Detail page for one coin.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    pub async fn page(&self, symbol: &str) -> Result<Page, ApiError> {
        self.get(&format!("page/{symbol}")).await
    }

    /// Price, market cap and volume history for one coin.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    pub async fn history(
        &self,
        symbol: &str,
        interval: HistoryInterval,
    ) -> Result<History, ApiError> {
        self.get(&interval.path_for(symbol)).await
    }

    /// `GET {base_url}{path}` and decode the JSON body.
    ///
    /// Network errors, 408, 429 and 5xx responses are retried with
    /// exponential backoff. 429 honors `Retry-After` when present.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] once retries are exhausted, on any other
    /// non-success status, or if the body does not decode into `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path.trim_start_matches('/'));
        let endpoint = endpoint_label(path);
        let mut policy = RetryPolicy::new(self.retry.clone());

        loop {
            let response = match self.client.get(&url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if let Some(delay) = policy.next_delay() {
                        tracing::warn!(
                            error = %e,
                            endpoint,
                            delay_ms = delay.as_millis(),
                            attempt = policy.attempt_count(),
                            "Network error, retrying"
                        );
                        metrics::record_http_request(endpoint, RequestOutcome::Retried);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    metrics::record_http_request(endpoint, RequestOutcome::Failed);
                    return Err(if policy.attempt_count() == 0 {
                        ApiError::Network(e.to_string())
                    } else {
                        ApiError::MaxRetriesExceeded {
                            attempts: policy.attempt_count() + 1,
                        }
                    });
                }
            };

            let status = response.status();

            if status.is_success() {
                let body = response.bytes().await.map_err(|e| {
                    metrics::record_http_request(endpoint, RequestOutcome::Failed);
                    ApiError::Network(e.to_string())
                })?;
                let decoded = serde_json::from_slice(&body);
                let outcome = if decoded.is_ok() {
                    RequestOutcome::Success
                } else {
                    RequestOutcome::Failed
                };
                metrics::record_http_request(endpoint, outcome);
                return decoded.map_err(ApiError::from);
            }

            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());

            let body = response.text().await.unwrap_or_default();

            match categorize_status(status) {
                ErrorCategory::RateLimited => {
                    if policy.should_retry() {
                        let backoff = policy.next_delay();
                        let delay = retry_after.map(Duration::from_secs).or(backoff);
                        if let Some(delay) = delay {
                            tracing::warn!(
                                endpoint,
                                delay_ms = delay.as_millis(),
                                "Rate limited, retrying"
                            );
                            metrics::record_http_request(endpoint, RequestOutcome::Retried);
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }
                    metrics::record_http_request(endpoint, RequestOutcome::Failed);
                    return Err(ApiError::RateLimited {
                        retry_after_secs: retry_after.unwrap_or(60),
                    });
                }
                ErrorCategory::Retryable => {
                    if let Some(delay) = policy.next_delay() {
                        tracing::warn!(
                            endpoint,
                            status = status.as_u16(),
                            delay_ms = delay.as_millis(),
                            attempt = policy.attempt_count(),
                            "Retryable error, retrying"
                        );
                        metrics::record_http_request(endpoint, RequestOutcome::Retried);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    metrics::record_http_request(endpoint, RequestOutcome::Failed);
                    return Err(if policy.attempt_count() == 0 {
                        ApiError::Status {
                            status: status.as_u16(),
                            body,
                        }
                    } else {
                        ApiError::MaxRetriesExceeded {
                            attempts: policy.attempt_count() + 1,
                        }
                    });
                }
                ErrorCategory::NonRetryable => {
                    metrics::record_http_request(endpoint, RequestOutcome::Failed);
                    return Err(ApiError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
            }
        }
    }
}

/// Error category for determining retry behavior.
#[derive(Debug, PartialEq, Eq)]
enum ErrorCategory {
    RateLimited,
    Retryable,
    NonRetryable,
}

/// Categorize HTTP status code for retry handling.
const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        429 => ErrorCategory::RateLimited,
        408 | 500 | 502 | 503 | 504 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

/// Metric label for a path: its first segment, so per-symbol paths share a
/// series.
fn endpoint_label(path: &str) -> &str {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default()
}
