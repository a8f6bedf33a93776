//! Error types for fedsign
//!
//! Every stage of the signed request pipeline (key lookup, signing,
//! transport, decoding) reports failures through `AppError`, so callers can
//! tell an unusable key apart from an unreachable or misbehaving peer.

use std::time::Duration;

use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Actor has no usable keypair
    #[error("No keypair found for actor {0}")]
    KeyNotFound(String),

    /// Private or public key could not be parsed or used
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// URL is malformed or has no host
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Remote peer answered with a non-2xx status
    #[error("Remote server responded with HTTP {code}")]
    HttpStatus { code: u16 },

    /// Response body is not the expected structured data
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Outbound object could not be serialized
    #[error("Failed to serialize object: {0}")]
    Serialize(String),

    /// Response body exceeded the configured limit
    #[error("Response body exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    /// Malformed caller input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Signature verification failed
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Stable label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::KeyNotFound(_) => "key_not_found",
            AppError::InvalidKey(_) => "invalid_key",
            AppError::InvalidUrl(_) => "invalid_url",
            AppError::Network(_) => "network",
            AppError::Timeout(_) => "timeout",
            AppError::HttpStatus { .. } => "http_status",
            AppError::Decode(_) => "decode",
            AppError::Serialize(_) => "serialize",
            AppError::ResponseTooLarge { .. } => "response_too_large",
            AppError::Validation(_) => "validation",
            AppError::InvalidSignature(_) => "invalid_signature",
            AppError::Config(_) => "config",
        }
    }

    /// Whether a later attempt of the same request could succeed.
    ///
    /// This layer never retries; the flag is for outer queueing code.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Network(_) | AppError::Timeout(_) => true,
            AppError::HttpStatus { code } => *code >= 500 || *code == 429,
            _ => false,
        }
    }

    /// HTTP status code reported by the remote peer, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AppError::HttpStatus { code } => Some(*code),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
