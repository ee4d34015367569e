//! Network I/O behind a trait, plus classification of finished exchanges.
//!
//! # Design
//! `Transport::send` performs exactly one attempt. It returns every HTTP
//! response as data, whatever its status, and only returns `Err` when no
//! response arrived at all. Deciding what a status means (and whether to try
//! again) is left to `retry`, so any transport, real or scripted, gets the
//! same retry behavior.
//!
//! `UreqTransport` wraps a `ureq::Agent`. The agent owns the connection pool,
//! is cheap to clone and safe to share between threads; it is handed to the
//! client explicitly so tests can run isolated pools side by side.

use std::time::Duration;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Executes one HTTP exchange.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

/// How a finished exchange should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// Worth another attempt after a backoff delay.
    Retryable,
    /// A request defect or a definitive answer; surfaced immediately.
    Fatal,
}

impl Classification {
    pub fn of_status(status: u16) -> Self {
        match status {
            200..=399 => Classification::Success,
            500..=599 => Classification::Retryable,
            _ => Classification::Fatal,
        }
    }

    pub fn of_error(error: &TransportError) -> Self {
        if error.is_retryable() {
            Classification::Retryable
        } else {
            Classification::Fatal
        }
    }
}

/// Blocking transport over a shared `ureq` connection pool.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// A transport with its own pool. Every connection attempt is bounded by
    /// `connect_timeout`; the whole exchange by the request's own timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(connect_timeout))
            .build()
            .new_agent();
        Self { agent }
    }

    /// Share an existing agent (and therefore its pool).
    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &ureq::Agent {
        &self.agent
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.path.as_str();
        let timeout = Some(request.timeout);

        let result = match request.method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(url);
                for (name, value) in &request.headers {
                    builder = builder.header(name, value);
                }
                builder.config().timeout_global(timeout).build().call()
            }
            HttpMethod::Delete => {
                let mut builder = self.agent.delete(url);
                for (name, value) in &request.headers {
                    builder = builder.header(name, value);
                }
                builder.config().timeout_global(timeout).build().call()
            }
            HttpMethod::Post => {
                let mut builder = self.agent.post(url);
                for (name, value) in &request.headers {
                    builder = builder.header(name, value);
                }
                let builder = builder.config().timeout_global(timeout).build();
                match &request.body {
                    Some(body) => builder.send(body.as_slice()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(|e| map_ureq_error(request, e))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| map_ureq_error(request, e))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_ureq_error(request: &HttpRequest, error: ureq::Error) -> TransportError {
    let url = request.path.clone();
    match error {
        ureq::Error::Timeout(_) => TransportError::Timeout {
            url,
            timeout_ms: request.timeout.as_millis() as u64,
        },
        ureq::Error::Io(e) => TransportError::Connection {
            url,
            message: e.to_string(),
        },
        failed @ (ureq::Error::ConnectionFailed | ureq::Error::HostNotFound) => {
            TransportError::Connection {
                url,
                message: failed.to_string(),
            }
        }
        other => TransportError::InvalidRequest {
            url,
            message: other.to_string(),
        },
    }
}
