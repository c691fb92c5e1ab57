//! Error types for the SupportLine domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all SupportLine operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Request errors ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Session {0} has no messages to summarize")]
    EmptySession(String),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Ticket not found: {0}")]
    TicketNotFound(u64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Lift a store lookup miss into the request-level `UnknownSession`.
    ///
    /// Every other store failure stays a storage error.
    pub fn from_lookup(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Error::UnknownSession(id),
            other => Error::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn lookup_miss_becomes_unknown_session() {
        let err = Error::from_lookup(StoreError::NotFound("abc".into()));
        assert!(matches!(err, Error::UnknownSession(ref id) if id == "abc"));

        let err = Error::from_lookup(StoreError::Storage("disk full".into()));
        assert!(matches!(err, Error::Store(StoreError::Storage(_))));
    }
}
