//! Error types for the profile sync engine.
//!
//! Mutations themselves never fail; the whole failure surface lives at the
//! I/O boundary (remote gateway, local cache).

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the remote CRUD gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No remote row exists for the requested identity. Callers treat this as
    /// a fallback signal, never as a hard failure.
    #[error("remote row not found")]
    NotFound,

    /// Transport-level failure (network down, timeout, DNS).
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The remote store rejected the request.
    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Authentication failure (missing or expired token).
    #[error("remote authentication failed: {0}")]
    Auth(String),
}

impl GatewayError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// True when the failure is transient and local state should simply wait
    /// for the next mutation-triggered flush.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Rejected { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::NotFound | Self::Auth(_) => false,
        }
    }
}

/// Errors produced by the local identity-keyed cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Engine was asked to load or flush before identity resolution finished.
    #[error("no identity resolved")]
    IdentityUnresolved,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        assert!(GatewayError::unavailable("connection refused").is_transient());
        assert!(GatewayError::rejected(503, "overloaded").is_transient());
        assert!(!GatewayError::rejected(400, "bad payload").is_transient());
        assert!(!GatewayError::NotFound.is_transient());
    }
}
