//! Error taxonomy for the courses API client.
//!
//! # Design
//! Three layers fail in three different ways:
//! - `TransportError`: the exchange did not complete (network, timeout, 5xx).
//!   Retryable variants are retried internally and only surface once the
//!   retry budget is spent, wrapped in `Exhausted` with the attempt count.
//! - `SerializationError`: a payload did not match its schema. Never retried.
//! - `DomainError`: the service understood the request and refused it.
//!   Never retried; the service's reason is carried verbatim.
//!
//! `ApiError` is what the domain client returns. Each variant names the
//! operation that failed so messages can be read without a backtrace.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("HTTP {status} from {url}: {body}")]
    Server {
        url: String,
        status: u16,
        body: String,
    },

    /// The request itself cannot be sent (bad URL, unsupported scheme).
    #[error("invalid request to {url}: {message}")]
    InvalidRequest { url: String, message: String },

    #[error("request to {url} was cancelled")]
    Cancelled { url: String },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Connection { .. }
                | TransportError::Timeout { .. }
                | TransportError::Server { .. }
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerializationError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(String),

    #[error("{record}: expected a JSON {expected}")]
    Shape {
        record: &'static str,
        expected: &'static str,
    },

    #[error("{record}: missing required field `{field}`")]
    MissingField { record: &'static str, field: String },

    #[error("{record}: field `{field}` {reason}")]
    InvalidField {
        record: &'static str,
        field: String,
        reason: String,
    },

    #[error("{record}: unknown field `{field}`")]
    UnknownField { record: &'static str, field: String },

    #[error("failed to encode {record}: {message}")]
    Encode {
        record: &'static str,
        message: String,
    },
}

impl SerializationError {
    /// Name (or path, for nested records) of the offending field.
    pub fn field(&self) -> Option<&str> {
        match self {
            SerializationError::MissingField { field, .. }
            | SerializationError::InvalidField { field, .. }
            | SerializationError::UnknownField { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("enrollment of student {student_id} in course {course_id} rejected (HTTP {status}): {reason}")]
    EnrollmentRejected {
        student_id: Uuid,
        course_id: Uuid,
        status: u16,
        reason: String,
    },

    #[error("{operation}: {resource} {id} not found")]
    NotFound {
        operation: &'static str,
        resource: &'static str,
        id: Uuid,
    },

    #[error("{operation}: request rejected (HTTP {status}): {reason}")]
    Rejected {
        operation: &'static str,
        status: u16,
        reason: String,
    },
}

/// Errors returned by `CoursesClient`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("{operation}: service unavailable after {attempts} attempts: {source}")]
    ServiceUnavailable {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("{operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("{operation}: {source}")]
    Serialization {
        operation: &'static str,
        #[source]
        source: SerializationError,
    },

    #[error("{operation}: unexpected HTTP {status}: {body}")]
    UnexpectedStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{operation}: cancelled before a response arrived")]
    Cancelled { operation: &'static str },
}

impl ApiError {
    pub(crate) fn serialization(operation: &'static str, source: SerializationError) -> Self {
        ApiError::Serialization { operation, source }
    }

    /// Sort a transport failure into the caller-facing variant.
    pub(crate) fn from_transport(operation: &'static str, source: TransportError) -> Self {
        match source {
            TransportError::Exhausted { attempts, .. } => ApiError::ServiceUnavailable {
                operation,
                attempts,
                source,
            },
            TransportError::Cancelled { .. } => ApiError::Cancelled { operation },
            source => ApiError::Transport { operation, source },
        }
    }

    /// True for `DomainError::NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Domain(DomainError::NotFound { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_maps_to_service_unavailable() {
        let last = TransportError::Server {
            url: "http://x/enrollments".to_string(),
            status: 503,
            body: String::new(),
        };
        let err = ApiError::from_transport(
            "enroll",
            TransportError::Exhausted {
                attempts: 3,
                last: Box::new(last),
            },
        );
        assert!(matches!(
            err,
            ApiError::ServiceUnavailable {
                operation: "enroll",
                attempts: 3,
                ..
            }
        ));
        assert!(err.to_string().starts_with("enroll: service unavailable after 3 attempts"));
    }

    #[test]
    fn cancelled_maps_to_cancelled() {
        let err = ApiError::from_transport(
            "cancel_enrollment",
            TransportError::Cancelled {
                url: "http://x".to_string(),
            },
        );
        assert!(matches!(err, ApiError::Cancelled { operation: "cancel_enrollment" }));
    }

    #[test]
    fn only_network_failures_are_retryable() {
        let timeout = TransportError::Timeout {
            url: String::new(),
            timeout_ms: 10,
        };
        let invalid = TransportError::InvalidRequest {
            url: String::new(),
            message: "bad uri".to_string(),
        };
        assert!(timeout.is_retryable());
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn serialization_error_exposes_field() {
        let err = SerializationError::MissingField {
            record: "CourseRecord",
            field: "title".to_string(),
        };
        assert_eq!(err.field(), Some("title"));
        assert_eq!(err.to_string(), "CourseRecord: missing required field `title`");
    }
}
