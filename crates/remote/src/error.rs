//! Error types for the remote profile store client.

use moneta_core::GatewayError;
use thiserror::Error;

/// Result type alias for remote store operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Errors that can occur talking to the cloud profile API.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the cloud service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Authentication error (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RemoteError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<RemoteError> for GatewayError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Http(inner) => GatewayError::Unavailable(inner.to_string()),
            RemoteError::Json(inner) => GatewayError::rejected(0, inner.to_string()),
            RemoteError::Api { status: 404, .. } => GatewayError::NotFound,
            RemoteError::Api {
                status: status @ (401 | 403),
                message,
            } => GatewayError::Auth(format!("({status}) {message}")),
            RemoteError::Api { status, message } => GatewayError::rejected(status, message),
            RemoteError::Auth(message) => GatewayError::Auth(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_row_maps_to_gateway_not_found() {
        let err: GatewayError = RemoteError::api(404, "no such profile").into();
        assert!(matches!(err, GatewayError::NotFound));
    }

    #[test]
    fn auth_statuses_map_to_gateway_auth() {
        let err: GatewayError = RemoteError::api(401, "unauthorized").into();
        assert!(matches!(err, GatewayError::Auth(_)));
        let err: GatewayError = RemoteError::api(403, "forbidden").into();
        assert!(matches!(err, GatewayError::Auth(_)));
    }

    #[test]
    fn transport_failures_map_to_unavailable() {
        // Server errors stay Rejected but classify as transient.
        let err: GatewayError = RemoteError::api(503, "overloaded").into();
        assert!(err.is_transient());
    }
}
