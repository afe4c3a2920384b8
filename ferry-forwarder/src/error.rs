//! Error types for the forwarder

use thiserror::Error;

/// Failures that stop a forward before the backend produced a usable answer.
///
/// Ordinary backend error statuses are not errors; they come back as a
/// [`ForwardResponse`](crate::ForwardResponse).
#[derive(Debug, Error)]
pub enum ForwardError {
    /// `POOL_ENDPOINT` is not configured
    #[error("Backend endpoint is not configured (POOL_ENDPOINT)")]
    MissingEndpoint,

    /// The configured endpoint cannot be turned into a request URL
    #[error("Invalid backend endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Bearer token acquisition failed
    #[error("Token acquisition failed: {0}")]
    Token(#[from] TokenError),

    /// The normalized payload could not be serialized
    #[error("Failed to serialize backend payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a [`TokenProvider`](crate::TokenProvider)
#[derive(Debug, Error)]
pub enum TokenError {
    /// The identity endpoint could not be reached
    #[error("Token request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The identity endpoint answered with an error status
    #[error("Identity endpoint returned {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The identity endpoint answered with something that is not a token
    #[error("Malformed token response: {0}")]
    Malformed(String),
}

/// A request never produced an HTTP response (DNS, connect, TLS, reset...)
#[derive(Debug, Error)]
#[error("Transport failure: {0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest's Display hides the cause; walk the chain.
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self(message)
    }
}
