//! Request dispatch
//!
//! Sends already-signed requests through a [`Transport`] and applies the
//! request deadline. No retries happen here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::error::AppError;
use crate::metrics::{ERRORS_TOTAL, FEDERATION_REQUEST_DURATION_SECONDS, FEDERATION_REQUESTS_TOTAL};

/// Fully formed request handed to a transport
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    /// Header name/value pairs in send order
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub timeout: Duration,
}

impl TransportRequest {
    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Response as received from the peer
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fail with `HttpStatus` unless the status is 2xx
    pub fn ensure_success(self) -> Result<Self, AppError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AppError::HttpStatus { code: self.status })
        }
    }
}

/// Network transport used by the dispatcher
///
/// Implementations report connection failures as `AppError::Network` and
/// deadline overruns as `AppError::Timeout`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: TransportRequest) -> Result<RawResponse, AppError>;
}

/// Transport backed by a shared `reqwest::Client`
#[derive(Clone)]
pub struct ReqwestTransport {
    http_client: Arc<reqwest::Client>,
    max_response_bytes: usize,
}

impl ReqwestTransport {
    /// Create new transport
    ///
    /// # Arguments
    /// * `http_client` - Shared client (connection pool)
    /// * `max_response_bytes` - Largest response body accepted
    pub fn new(http_client: Arc<reqwest::Client>, max_response_bytes: usize) -> Self {
        Self {
            http_client,
            max_response_bytes,
        }
    }

    /// Build a client suitable for federation traffic.
    pub fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, AppError> {
        reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))
    }

    fn map_error(error: reqwest::Error, timeout: Duration) -> AppError {
        if error.is_timeout() {
            AppError::Timeout(timeout)
        } else {
            AppError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn call(&self, request: TransportRequest) -> Result<RawResponse, AppError> {
        let timeout = request.timeout;
        let mut builder = self
            .http_client
            .request(request.method, request.url.as_str())
            .timeout(timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(e, timeout))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();

        if let Some(length) = response.content_length() {
            if length > self.max_response_bytes as u64 {
                return Err(AppError::ResponseTooLarge {
                    limit: self.max_response_bytes,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::map_error(e, timeout))?
        {
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(AppError::ResponseTooLarge {
                    limit: self.max_response_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(RawResponse {
            status,
            headers,
            body: Bytes::from(body),
        })
    }
}

/// Which pipeline a request belongs to, for logs and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Deliver,
    Fetch,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Deliver => "deliver",
            Direction::Fetch => "fetch",
        }
    }
}

/// Dispatches signed requests with a uniform deadline
#[derive(Clone)]
pub struct RequestDispatcher {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl RequestDispatcher {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request and return the raw response
    ///
    /// The deadline covers connecting, sending and reading the body.
    /// Non-2xx responses are returned as-is; see [`RawResponse::ensure_success`].
    ///
    /// # Errors
    /// `Timeout` past the deadline, `Network` on connection failure
    pub async fn send(
        &self,
        direction: Direction,
        method: Method,
        url: &str,
        headers: Vec<(String, String)>,
        body: Option<Bytes>,
    ) -> Result<RawResponse, AppError> {
        let request = TransportRequest {
            method,
            url: url.to_string(),
            headers,
            body,
            timeout: self.timeout,
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.transport.call(request)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.timeout)),
        };

        FEDERATION_REQUEST_DURATION_SECONDS
            .with_label_values(&[direction.as_str()])
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(response) => {
                let status = response.status.to_string();
                FEDERATION_REQUESTS_TOTAL
                    .with_label_values(&[direction.as_str(), status.as_str()])
                    .inc();
                tracing::debug!(
                    url = %url,
                    status = response.status,
                    direction = direction.as_str(),
                    "Federation request completed"
                );
            }
            Err(error) => {
                FEDERATION_REQUESTS_TOTAL
                    .with_label_values(&[direction.as_str(), error.kind()])
                    .inc();
                ERRORS_TOTAL
                    .with_label_values(&[error.kind(), direction.as_str()])
                    .inc();
                tracing::debug!(
                    url = %url,
                    error = %error,
                    direction = direction.as_str(),
                    "Federation request failed"
                );
            }
        }

        result
    }
}
