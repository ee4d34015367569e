//! Domain DTOs for the foreign language courses API.
//!
//! # Design
//! These types mirror the wire schema of the remote service but are defined
//! independently from the mock-server crate. Integration tests catch any
//! schema drift between the two. Field order is declaration order, which
//! keeps encoded payloads byte-stable (see `codec`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// CEFR proficiency level of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::A1,
        Level::A2,
        Level::B1,
        Level::B2,
        Level::C1,
        Level::C2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::A1 => "A1",
            Level::A2 => "A2",
            Level::B1 => "B1",
            Level::B2 => "B2",
            Level::C1 => "C1",
            Level::C2 => "C2",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| format!("unknown level `{s}`"))
    }
}

/// A course as published by the service. The client only reads copies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub id: Uuid,
    pub title: String,
    pub language: String,
    pub level: Level,
    pub schedule: String,
}

/// One page of `GET /courses`. An empty `items` list marks the end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CoursePage {
    pub items: Vec<CourseRecord>,
    pub page: u32,
}

/// Query parameters for listing courses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseFilter {
    pub language: Option<String>,
    pub level: Option<Level>,
    pub page_size: u32,
}

impl Default for CourseFilter {
    fn default() -> Self {
        Self {
            language: None,
            level: None,
            page_size: 20,
        }
    }
}

/// Client-generated token that makes repeated delivery of one enrollment
/// equivalent to a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Request payload for enrolling a student in a course.
///
/// The idempotency key is fixed when the request is built; retries resend
/// the same bytes and the same key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRequest {
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub requested_at: DateTime<Utc>,
    pub idempotency_key: IdempotencyKey,
}

impl EnrollmentRequest {
    /// A request stamped with the current time and a fresh idempotency key.
    pub fn new(student_id: Uuid, course_id: Uuid) -> Self {
        Self {
            student_id,
            course_id,
            requested_at: Utc::now(),
            idempotency_key: IdempotencyKey::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Confirmed,
    Rejected,
    Pending,
}

/// What the service decided about an enrollment request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentResult {
    pub enrollment_id: Option<Uuid>,
    pub outcome: Outcome,
    pub reason: Option<String>,
}

/// Body of a 4xx answer from the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub reason: String,
}

/// Request payload for creating a course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub language: String,
    pub level: Level,
    pub schedule: String,
    pub created_at: DateTime<Utc>,
}

/// Request payload for registering a student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub registered_at: DateTime<Utc>,
}

/// Request payload for opening a study group within a course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    pub name: String,
    pub course_id: Uuid,
    pub schedule: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: Uuid,
    pub name: String,
    pub course_id: Uuid,
    pub schedule: Vec<String>,
}
