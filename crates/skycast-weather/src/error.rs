//! Error types for the weather data layer.
//!
//! `DomainError` is the closed set of failure causes surfaced to callers.
//! The remaining enums describe failures of the collaborators (transport,
//! cache, preferences) before they are classified.

use thiserror::Error;

/// Why a weather or search request failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Network unavailable")]
    Network,

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP error {code}: {}", .message.as_deref().unwrap_or("no message"))]
    HttpError { code: i32, message: Option<String> },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Server error")]
    ServerError,

    #[error("Empty response body")]
    EmptyBody,

    #[error("Malformed response")]
    Parsing,

    #[error("Unknown error")]
    Unknown,
}

impl DomainError {
    /// Stable identifier a presentation layer can look up in its string table.
    pub fn message_id(&self) -> &'static str {
        match self {
            DomainError::Network => "error_network",
            DomainError::Timeout => "error_timeout",
            DomainError::HttpError { .. } => "error_http",
            DomainError::Unauthorized => "error_unauthorized",
            DomainError::NotFound => "error_not_found",
            DomainError::ServerError => "error_server",
            DomainError::EmptyBody => "error_empty_body",
            DomainError::Parsing => "error_parsing",
            DomainError::Unknown => "error_unknown",
        }
    }

    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            DomainError::Network => "Unable to connect. Check your internet connection.",
            DomainError::Timeout => "The request timed out. Please try again.",
            DomainError::HttpError { .. } => "The weather service rejected the request.",
            DomainError::Unauthorized => "Weather API key is invalid. Check settings.",
            DomainError::NotFound => "Location not found. Check and try again.",
            DomainError::ServerError => {
                "The weather service is experiencing issues. Please try again later."
            }
            DomainError::EmptyBody => "The weather service returned no data.",
            DomainError::Parsing => "Received an unexpected response. Please try again.",
            DomainError::Unknown => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Failure reported by a [`Transport`](crate::transport::Transport) before any
/// HTTP response was available.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("HTTP status {code}")]
    Status { code: u16, reason: Option<String> },

    #[error("Transport failure: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = error.status() {
            TransportError::Status {
                code: status.as_u16(),
                reason: status.canonical_reason().map(str::to_string),
            }
        } else if error.is_connect() || error.is_request() || error.is_body() {
            TransportError::Io(error.to_string())
        } else {
            TransportError::Other(error.to_string())
        }
    }
}

/// Forecast cache failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Corrupt cache entry for {name}: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache task failed: {0}")]
    Task(String),

    #[error("Cache write abandoned by its caller")]
    Abandoned,
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Preference store failures.
#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Preference task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_are_distinct() {
        let all = [
            DomainError::Network,
            DomainError::Timeout,
            DomainError::HttpError {
                code: 418,
                message: None,
            },
            DomainError::Unauthorized,
            DomainError::NotFound,
            DomainError::ServerError,
            DomainError::EmptyBody,
            DomainError::Parsing,
            DomainError::Unknown,
        ];
        let mut ids: Vec<_> = all.iter().map(DomainError::message_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), all.len());
        assert!(all.iter().all(|e| !e.user_message().is_empty()));
    }

    #[test]
    fn test_http_error_display() {
        let err = DomainError::HttpError {
            code: 429,
            message: Some("rate limited".into()),
        };
        assert_eq!(err.to_string(), "HTTP error 429: rate limited");

        let err = DomainError::HttpError {
            code: 400,
            message: None,
        };
        assert_eq!(err.to_string(), "HTTP error 400: no message");
    }
}
