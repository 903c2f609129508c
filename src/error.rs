//! Error types for the Kanban client

use reqwest::StatusCode;
use thiserror::Error;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// The server rejected the credentials and no further refresh is attempted
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Tokens were cleared and the session must be re-established by logging in
    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Build the error surfaced for a non-success response
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized(body),
            _ => Self::Status {
                status: status.as_u16(),
                body,
            },
        }
    }

    /// HTTP status carried by this error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized(_) => Some(StatusCode::UNAUTHORIZED.as_u16()),
            Self::Status { status, .. } => Some(*status),
            Self::HttpRequest(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
