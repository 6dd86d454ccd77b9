//! HTTP transport types and the blocking transport used by the client.
//!
//! # Design
//! `DataApiClient` builds `HttpRequest` values and parses `HttpResponse`
//! values as plain data. Only a `Transport` touches the network, so request
//! building and response parsing stay deterministic and testable with a
//! canned transport. `UreqTransport` is the production implementation.
//!
//! Every data-API action is a POST, so requests carry no method field.

use std::time::Duration;

use thiserror::Error;

/// A POST request described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    /// First header value with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Largest response body `UreqTransport` will read.
pub const RESPONSE_BODY_LIMIT: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    /// No response was obtained: DNS failure, refused connection, timeout.
    #[error("{0}")]
    NoResponse(String),

    /// A status line arrived but the body could not be read in full.
    #[error("HTTP {status}: failed to read response body: {reason}")]
    UnreadableBody { status: u16, reason: String },
}

/// Executes one request and returns whatever the server answered.
///
/// Non-2xx responses are returned as `Ok`; status interpretation belongs to
/// the client.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by a `ureq` agent.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// `timeout` bounds each whole request; `None` waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.agent.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder
            .send(request.body.as_bytes())
            .map_err(|e| TransportError::NoResponse(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .with_config()
            .limit(RESPONSE_BODY_LIMIT)
            .read_to_string()
            .map_err(|e| TransportError::UnreadableBody { status, reason: e.to_string() })?;

        Ok(HttpResponse { status, body })
    }
}
