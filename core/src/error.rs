//! Error types for the DocumentDB data-API client.
//!
//! # Design
//! Remote failures and malformed responses are the only two ways a call that
//! reached the network can fail. Everything the caller got wrong is reported
//! as `Validation` before a request is ever sent, so tooling can tell bad
//! input apart from a server or network problem.

use thiserror::Error;

use crate::types::Action;

/// Errors returned by the client, the task layer, and record stores.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Caller input was rejected before any network call.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The request never got a response, or the server answered non-2xx.
    #[error("{action} failed: {}", describe_remote(.status, .body, .cause))]
    RemoteOperation {
        action: Action,
        /// `None` when no response was received.
        status: Option<u16>,
        /// Raw response body, `None` when no response was received.
        body: Option<String>,
        /// Transport-level failure message, if any.
        cause: Option<String>,
    },

    /// The server answered 2xx but the body was not the JSON object expected.
    #[error("{action} returned a malformed response: {reason}")]
    MalformedResponse { action: Action, reason: String },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Persisting fetched records failed.
    #[error("failed to store records: {0}")]
    Storage(#[from] std::io::Error),
}

impl ApiError {
    /// True for precondition violations raised before any I/O.
    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::Validation(_))
    }

    /// True for transport failures and non-2xx responses.
    pub fn is_remote(&self) -> bool {
        matches!(self, ApiError::RemoteOperation { .. })
    }

    /// HTTP status of a remote failure, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RemoteOperation { status, .. } => *status,
            _ => None,
        }
    }
}

fn describe_remote(status: &Option<u16>, body: &Option<String>, cause: &Option<String>) -> String {
    match (status, body, cause) {
        (Some(status), Some(body), _) => format!("HTTP {status}: {body}"),
        (Some(status), None, Some(cause)) => format!("HTTP {status}: {cause}"),
        (Some(status), None, None) => format!("HTTP {status}: <no body>"),
        (None, _, Some(cause)) => format!("no response received: {cause}"),
        (None, _, None) => "no response received".to_string(),
    }
}
