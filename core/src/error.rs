//! Error types for the Pinry API client.
//!
//! # Design
//! Every failure propagates unchanged to the caller; nothing in the client
//! retries or recovers locally. Non-2xx responses land in `HttpError` with the
//! raw status code and body. Payloads that cannot be turned into a typed
//! record (missing fields, a user link without an id, a bad timestamp) land in
//! `DeserializationError`, so a record is either fully built or not at all.

use thiserror::Error;

/// Errors returned by the Pinry client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The request never produced a response (connection refused, DNS, ...).
    #[error("transport failed: {0}")]
    TransportError(String),

    /// The response body could not be turned into the expected record.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Reading an image from disk or from a stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lookup expecting at least one result found none.
    #[error("no {0} found")]
    EmptyResult(&'static str),

    /// A unique lookup found zero or several results.
    #[error("expected exactly one result, found {found}")]
    Cardinality { found: usize },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for Pinry client operations.
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// The HTTP status carried by an `HttpError`, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::DeserializationError(err.to_string())
    }
}
