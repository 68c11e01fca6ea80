//! Collaborator seams: the HTTP transport and the authentication hook.
//!
//! The client never performs I/O itself. Every round-trip goes through a
//! [`Transport`]; whatever error it returns is surfaced unchanged as
//! [`Error::Transport`](crate::Error::Transport). Retries and timeouts are the
//! transport's business.

use crate::error::BoxError;
use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;

/// Outgoing request as handed to the transport.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: Method,
    /// Absolute, percent-encoded request URL.
    pub uri: String,
    pub headers: HeaderMap,
    /// JSON body for writes.
    pub body: Option<String>,
    pub timeout: Option<Duration>,
    /// Whether the caller wants the body streamed rather than buffered.
    pub stream: bool,
}

impl TransportRequest {
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            stream: false,
        }
    }
}

/// Raw response produced by the transport.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TransportResponse {
    /// 200 OK with the given body and no headers.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Performs one blocking HTTP round-trip.
pub trait Transport: Send + Sync {
    /// Send the request and return the raw response.
    ///
    /// # Errors
    /// Any network or protocol failure; it reaches the caller unchanged.
    fn send(&self, request: TransportRequest) -> Result<TransportResponse, BoxError>;
}

impl<F> Transport for F
where
    F: Fn(TransportRequest) -> Result<TransportResponse, BoxError> + Send + Sync,
{
    fn send(&self, request: TransportRequest) -> Result<TransportResponse, BoxError> {
        self(request)
    }
}

/// Hook invoked with every outgoing request just before it is sent.
///
/// Typically inserts an `Authorization` header.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, request: &mut TransportRequest);
}

impl<F> Authenticator for F
where
    F: Fn(&mut TransportRequest) + Send + Sync,
{
    fn authenticate(&self, request: &mut TransportRequest) {
        self(request);
    }
}
