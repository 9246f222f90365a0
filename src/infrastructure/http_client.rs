//! HTTP client for supplier APIs and web crawling
//!
//! Thin wrapper over reqwest with a per-request timeout, bounded retry
//! with exponential backoff, and status-aware error classification so
//! connectors can tell an auth rejection apart from a network blip.

use reqwest::{Client, ClientBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for HTTP client behavior
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Maximum number of attempts for failed requests
    pub max_retries: u32,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_retries: 3,
            user_agent: "supplier-hub/0.3 (catalog ingestion)".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP status {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("request failed for {url}: {message}")]
    Request { url: String, message: String },

    #[error("response body invalid for {url}: {message}")]
    Body { url: String, message: String },
}

impl HttpError {
    /// Credential rejections are not worth retrying and must abort a run.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::Status { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
        )
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(
                *status,
                StatusCode::REQUEST_TIMEOUT
                    | StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
                    | StatusCode::INTERNAL_SERVER_ERROR
            ),
            Self::Request { .. } => true,
            Self::Body { .. } => false,
        }
    }
}

/// HTTP client with retry and backoff applied per request.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, HttpError> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .gzip(true)
            .build()
            .map_err(|e| HttpError::Request {
                url: String::new(),
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    /// GET a JSON document with the given extra headers.
    pub async fn get_json(&self, url: &str, headers: &[(String, String)]) -> Result<Value, HttpError> {
        let body = self.get_with_retry(url, headers).await?;
        serde_json::from_str(&body).map_err(|e| HttpError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// GET a page body as text (HTML crawling path).
    pub async fn get_text(&self, url: &str, headers: &[(String, String)]) -> Result<String, HttpError> {
        self.get_with_retry(url, headers).await
    }

    async fn get_with_retry(&self, url: &str, headers: &[(String, String)]) -> Result<String, HttpError> {
        let mut last_error = None;

        for attempt in 1..=self.config.max_retries.max(1) {
            match self.get_once(url, headers).await {
                Ok(body) => {
                    debug!(url, attempt, "HTTP GET succeeded");
                    return Ok(body);
                }
                Err(e) => {
                    let giving_up = !e.retryable() || attempt >= self.config.max_retries;
                    warn!(url, attempt, error = %e, giving_up, "HTTP GET failed");
                    if giving_up {
                        return Err(e);
                    }
                    last_error = Some(e);
                    // Exponential backoff between attempts
                    sleep(Duration::from_secs(2_u64.pow(attempt - 1))).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| HttpError::Request {
            url: url.to_string(),
            message: "unknown error".to_string(),
        }))
    }

    async fn get_once(&self, url: &str, headers: &[(String, String)]) -> Result<String, HttpError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| HttpError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                status,
                url: url.to_string(),
            });
        }

        response.text().await.map_err(|e| HttpError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
