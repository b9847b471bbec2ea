//! Error types for the GridParley domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator has its own error enum, folded into [`Error`].

use thiserror::Error;

/// The top-level error type for all GridParley operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Remote completion service ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Configuration errors (unsupported task, agent count, model) ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- A decision cycle ran out of retries ---
    #[error("Query failed after {attempts} attempts: {last_error}")]
    QueryExhausted { attempts: u32, last_error: String },

    // --- Protocol misuse between controller and agent ---
    #[error("Agent state error: {0}")]
    State(String),

    // --- Environment collaborator ---
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// How the query layer should react to a [`ProviderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network, timeout or rate limit. Retried with exponential backoff.
    Transient,
    /// The service answered with a server-side failure. Retried with a
    /// short linear backoff inside a single attempt.
    Service,
    /// Unsupported model, bad credentials or a malformed request. Never retried.
    Fatal,
    /// Anything the client could not interpret. Degrades to an empty payload.
    Unstructured,
}

// --- Collaborator errors ---

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

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Classify this error for the retry layers.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => ErrorClass::Transient,
            Self::ApiError { status_code, .. } => match *status_code {
                408 => ErrorClass::Transient,
                s if s >= 500 => ErrorClass::Service,
                _ => ErrorClass::Fatal,
            },
            Self::AuthenticationFailed(_) | Self::ModelNotFound(_) | Self::NotConfigured(_) => {
                ErrorClass::Fatal
            }
            Self::MalformedResponse(_) => ErrorClass::Unstructured,
        }
    }
}

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Environment transport failed: {0}")]
    Transport(String),

    #[error("Environment returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode environment payload: {0}")]
    Decode(String),

    #[error("No observation for agent '{0}'")]
    MissingObservation(String),

    #[error("Environment closed")]
    Closed,
}
