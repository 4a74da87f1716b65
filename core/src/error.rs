//! Error types for the KnowShowGo client.
//!
//! # Design
//! `NotFound` gets its own variant because callers routinely branch on
//! "the uuid does not exist". Every other 4xx/5xx lands in `HttpError` with
//! the raw status and body. Nothing here is retried or reinterpreted.

/// Errors returned by `KnowShowGoClient::parse_*` and every `Session` call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server returned 404.
    #[error("resource not found: {body}")]
    NotFound { body: String },

    /// The server returned a 4xx/5xx status other than 404.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The request never produced a response (connection refused, DNS, timeout).
    #[error("transport failure: {0}")]
    Transport(#[from] ureq::Error),

    /// The response body could not be deserialized.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// A success response did not carry the field the operation returns.
    #[error("response is missing field `{0}`")]
    MissingField(&'static str),
}

impl ApiError {
    /// HTTP status attached to the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { .. } => Some(404),
            ApiError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
