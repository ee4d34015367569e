//! HTTP exchange types shared by the domain client and the transport.
//!
//! # Design
//! Requests and responses are plain data. The domain client builds
//! `HttpRequest` values and parses `HttpResponse` values without touching the
//! network; a `Transport` implementation performs the I/O in between. This
//! keeps request construction and response mapping deterministic and easy to
//! test with canned responses.

use std::fmt;
use std::time::Duration;

/// Per-request timeout used when nothing else is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
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
/// `path` is the absolute URL. The body is the already-encoded JSON payload,
/// so a retried request resends exactly the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: String) -> Self {
        Self {
            method,
            path,
            headers: Vec::new(),
            body: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_json_body(mut self, body: Vec<u8>) -> Self {
        self.headers
            .push(("content-type".to_string(), "application/json".to_string()));
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Body as text for error messages; invalid UTF-8 is replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_sets_content_type() {
        let req = HttpRequest::new(HttpMethod::Post, "http://x/y".to_string())
            .with_json_body(b"{}".to_vec());
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.body.as_deref(), Some(&b"{}"[..]));
        assert_eq!(req.timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut resp = HttpResponse::new(200, "");
        resp.headers
            .push(("Idempotency-Key".to_string(), "abc".to_string()));
        assert_eq!(resp.header("idempotency-key"), Some("abc"));
        assert_eq!(resp.header("x-missing"), None);
    }
}
