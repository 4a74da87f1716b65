//! HTTP transport types shared by the request builder and the session.
//!
//! # Design
//! Requests and responses are plain data. `KnowShowGoClient` builds
//! `HttpRequest` values and parses `HttpResponse` values without touching the
//! network; `Session` is the only place that performs I/O. Keeping the two
//! apart lets every wire detail be tested without a server.

use std::fmt;

/// HTTP method for a request. The KnowShowGo API only uses GET and POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
///
/// `url` is the full URL without the query string; query pairs are kept
/// separately so the transport can encode them.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Response with no headers, mostly useful for tests and replays.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}
