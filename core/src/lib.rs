//! Blocking API client core for the foreign language courses service.
//!
//! # Overview
//! `CoursesClient` turns typed operations (list courses, enroll, cancel an
//! enrollment, create seed data) into HTTP exchanges and maps the answers
//! back to domain values or a classified `ApiError`.
//!
//! # Design
//! - `types`: wire DTOs; `codec`: deterministic encoding and schema-checked
//!   decoding of those DTOs.
//! - `http`: requests and responses as plain data; `transport`: the trait
//!   that performs one exchange plus the `ureq`-backed pooled implementation.
//! - `retry`: bounded exponential backoff with jitter and cancellation,
//!   written as an explicit state machine around any `Transport`.
//! - `client`: `build_*` / `parse_*` pairs per operation and the composed
//!   operations; `enrollment`: the per-enrollment state machine.
//! - `config`: defaults, TOML file and environment overrides.

pub mod client;
pub mod codec;
pub mod config;
pub mod enrollment;
pub mod error;
pub mod http;
pub mod retry;
pub mod transport;
pub mod types;

pub use client::{CoursePages, CoursesClient, IDEMPOTENCY_HEADER};
pub use config::{ClientConfig, ConfigError};
pub use enrollment::{EnrollmentAttempt, EnrollmentEvent, EnrollmentState};
pub use error::{ApiError, DomainError, SerializationError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use retry::{CancelToken, RetryPolicy, RetryingTransport, Sleeper, ThreadSleeper};
pub use transport::{Classification, Transport, UreqTransport};
pub use types::{
    CourseFilter, CoursePage, CourseRecord, EnrollmentRequest, EnrollmentResult, GroupRecord,
    IdempotencyKey, Level, NewCourse, NewGroup, NewStudent, Outcome, Rejection, StudentRecord,
};
