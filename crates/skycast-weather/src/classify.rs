//! Maps transport failures and HTTP error responses onto [`DomainError`].

use crate::api::ErrorResponse;
use crate::error::{DomainError, TransportError};

/// Classify a failure that happened before an HTTP response was available.
pub fn classify_transport_error(error: &TransportError) -> DomainError {
    match error {
        TransportError::Timeout => DomainError::Timeout,
        TransportError::Io(_) => DomainError::Network,
        TransportError::Status { code, reason } => {
            classify_http_response(*code, reason.as_deref(), None)
        }
        TransportError::Other(_) => DomainError::Unknown,
    }
}

/// Classify a non-2xx response.
///
/// The error payload's own `cod` takes precedence over the transport status
/// when the body parses; otherwise the transport status is bucketed the same way.
pub fn classify_http_response(status: u16, reason: Option<&str>, body: Option<&str>) -> DomainError {
    let payload = body.and_then(|b| serde_json::from_str::<ErrorResponse>(b).ok());

    if let Some(payload) = payload {
        tracing::debug!(
            status,
            payload_code = payload.code,
            "Classifying error by payload code"
        );
        return bucket(payload.code).unwrap_or(DomainError::HttpError {
            code: payload.code,
            message: Some(payload.message),
        });
    }

    let code = i32::from(status);
    bucket(code).unwrap_or_else(|| DomainError::HttpError {
        code,
        message: reason.map(str::to_string),
    })
}

fn bucket(code: i32) -> Option<DomainError> {
    match code {
        401 => Some(DomainError::Unauthorized),
        404 => Some(DomainError::NotFound),
        500..=599 => Some(DomainError::ServerError),
        _ => None,
    }
}
