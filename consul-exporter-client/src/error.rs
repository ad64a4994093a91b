//! Error types for the Consul client.

use thiserror::Error;

/// Errors that can occur when talking to Consul.
#[derive(Debug, Error)]
pub enum ConsulError {
    /// The configured address is not a usable HTTP(S) URL.
    #[error("invalid consul address: {0}")]
    InvalidAddress(String),

    /// TLS material could not be loaded.
    #[error("TLS configuration failed: {0}")]
    Tls(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Consul answered with a non-success status.
    #[error("Consul returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for ConsulError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ConsulError::Timeout
        } else if err.is_connect() {
            ConsulError::Connection(err.to_string())
        } else if err.is_decode() {
            ConsulError::Parse(err.to_string())
        } else {
            ConsulError::Http(err.to_string())
        }
    }
}
