//! JSON encoding and schema-checked decoding of wire records.
//!
//! # Design
//! Every record kind declares a fixed `Schema`: the complete set of fields it
//! may carry and the semantic kind of each one. `decode` checks a payload
//! against that schema before serde builds the typed value, so a bad payload
//! is reported with the name of the offending field instead of a generic
//! parse error, and unknown fields are refused rather than ignored.
//!
//! `encode` serializes the struct directly. Field order follows the struct
//! declaration, so the same value always produces the same bytes.

use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::SerializationError;
use crate::types::{
    CoursePage, CourseRecord, EnrollmentRequest, EnrollmentResult, GroupRecord, NewCourse,
    NewGroup, NewStudent, Rejection, StudentRecord,
};

/// Semantic type of a single field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Uuid,
    OptionalUuid,
    /// Non-empty (after trimming) string.
    Text,
    OptionalText,
    /// RFC 3339 timestamp string.
    Timestamp,
    OneOf(&'static [&'static str]),
    /// Array of non-empty strings.
    TextList,
    /// Integer in `0..=u32::MAX`.
    Count,
    List(&'static Schema),
}

impl FieldKind {
    fn is_optional(self) -> bool {
        matches!(self, FieldKind::OptionalUuid | FieldKind::OptionalText)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> Field {
    Field { name, kind }
}

/// The fixed field set of one record kind.
#[derive(Debug)]
pub struct Schema {
    pub record: &'static str,
    pub fields: &'static [Field],
}

/// A type with a wire schema.
pub trait Record: Serialize + DeserializeOwned {
    const SCHEMA: &'static Schema;
}

const LEVELS: &[&str] = &["A1", "A2", "B1", "B2", "C1", "C2"];
const OUTCOMES: &[&str] = &["confirmed", "rejected", "pending"];

const COURSE_RECORD: Schema = Schema {
    record: "CourseRecord",
    fields: &[
        field("id", FieldKind::Uuid),
        field("title", FieldKind::Text),
        field("language", FieldKind::Text),
        field("level", FieldKind::OneOf(LEVELS)),
        field("schedule", FieldKind::Text),
    ],
};

const COURSE_PAGE: Schema = Schema {
    record: "CoursePage",
    fields: &[
        field("items", FieldKind::List(&COURSE_RECORD)),
        field("page", FieldKind::Count),
    ],
};

const ENROLLMENT_REQUEST: Schema = Schema {
    record: "EnrollmentRequest",
    fields: &[
        field("studentId", FieldKind::Uuid),
        field("courseId", FieldKind::Uuid),
        field("requestedAt", FieldKind::Timestamp),
        field("idempotencyKey", FieldKind::Uuid),
    ],
};

const ENROLLMENT_RESULT: Schema = Schema {
    record: "EnrollmentResult",
    fields: &[
        field("enrollmentId", FieldKind::OptionalUuid),
        field("outcome", FieldKind::OneOf(OUTCOMES)),
        field("reason", FieldKind::OptionalText),
    ],
};

const REJECTION: Schema = Schema {
    record: "Rejection",
    fields: &[field("reason", FieldKind::Text)],
};

const NEW_COURSE: Schema = Schema {
    record: "NewCourse",
    fields: &[
        field("title", FieldKind::Text),
        field("description", FieldKind::Text),
        field("language", FieldKind::Text),
        field("level", FieldKind::OneOf(LEVELS)),
        field("schedule", FieldKind::Text),
        field("createdAt", FieldKind::Timestamp),
    ],
};

const NEW_STUDENT: Schema = Schema {
    record: "NewStudent",
    fields: &[
        field("firstName", FieldKind::Text),
        field("lastName", FieldKind::Text),
        field("email", FieldKind::Text),
        field("registeredAt", FieldKind::Timestamp),
    ],
};

const STUDENT_RECORD: Schema = Schema {
    record: "StudentRecord",
    fields: &[
        field("id", FieldKind::Uuid),
        field("firstName", FieldKind::Text),
        field("lastName", FieldKind::Text),
        field("email", FieldKind::Text),
        field("registeredAt", FieldKind::Timestamp),
    ],
};

const NEW_GROUP: Schema = Schema {
    record: "NewGroup",
    fields: &[
        field("name", FieldKind::Text),
        field("courseId", FieldKind::Uuid),
        field("schedule", FieldKind::TextList),
    ],
};

const GROUP_RECORD: Schema = Schema {
    record: "GroupRecord",
    fields: &[
        field("id", FieldKind::Uuid),
        field("name", FieldKind::Text),
        field("courseId", FieldKind::Uuid),
        field("schedule", FieldKind::TextList),
    ],
};

impl Record for CourseRecord {
    const SCHEMA: &'static Schema = &COURSE_RECORD;
}

impl Record for CoursePage {
    const SCHEMA: &'static Schema = &COURSE_PAGE;
}

impl Record for EnrollmentRequest {
    const SCHEMA: &'static Schema = &ENROLLMENT_REQUEST;
}

impl Record for EnrollmentResult {
    const SCHEMA: &'static Schema = &ENROLLMENT_RESULT;
}

impl Record for Rejection {
    const SCHEMA: &'static Schema = &REJECTION;
}

impl Record for NewCourse {
    const SCHEMA: &'static Schema = &NEW_COURSE;
}

impl Record for NewStudent {
    const SCHEMA: &'static Schema = &NEW_STUDENT;
}

impl Record for StudentRecord {
    const SCHEMA: &'static Schema = &STUDENT_RECORD;
}

impl Record for NewGroup {
    const SCHEMA: &'static Schema = &NEW_GROUP;
}

impl Record for GroupRecord {
    const SCHEMA: &'static Schema = &GROUP_RECORD;
}

/// Serialize `value` to JSON bytes after checking it against its schema.
///
/// Refusing to encode an invalid record (an empty title, say) keeps request
/// defects on this side of the wire.
pub fn encode<T: Record>(value: &T) -> Result<Vec<u8>, SerializationError> {
    let record = T::SCHEMA.record;
    let as_value = serde_json::to_value(value).map_err(|e| SerializationError::Encode {
        record,
        message: e.to_string(),
    })?;
    validate(T::SCHEMA, &as_value)?;
    serde_json::to_vec(value).map_err(|e| SerializationError::Encode {
        record,
        message: e.to_string(),
    })
}

/// Parse `bytes` as a `T`, rejecting anything outside `T::SCHEMA`.
pub fn decode<T: Record>(bytes: &[u8]) -> Result<T, SerializationError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| SerializationError::Malformed(e.to_string()))?;
    validate(T::SCHEMA, &value)?;
    serde_json::from_value(value).map_err(|e| SerializationError::Malformed(e.to_string()))
}

/// Check a JSON value against a schema.
pub fn validate(schema: &Schema, value: &Value) -> Result<(), SerializationError> {
    validate_at(schema, value, "")
}

fn validate_at(schema: &Schema, value: &Value, prefix: &str) -> Result<(), SerializationError> {
    let record = schema.record;
    let object = value.as_object().ok_or(SerializationError::Shape {
        record,
        expected: "object",
    })?;

    if let Some(unknown) = object
        .keys()
        .find(|key| !schema.fields.iter().any(|f| f.name == key.as_str()))
    {
        return Err(SerializationError::UnknownField {
            record,
            field: join(prefix, unknown),
        });
    }

    for f in schema.fields {
        let path = join(prefix, f.name);
        match object.get(f.name) {
            None if f.kind.is_optional() => {}
            None => return Err(SerializationError::MissingField { record, field: path }),
            Some(Value::Null) if f.kind.is_optional() => {}
            Some(Value::Null) => {
                return Err(invalid(record, path, "must not be null"));
            }
            Some(v) => check_kind(record, &path, f.kind, v)?,
        }
    }
    Ok(())
}

fn check_kind(
    record: &'static str,
    path: &str,
    kind: FieldKind,
    value: &Value,
) -> Result<(), SerializationError> {
    match kind {
        FieldKind::Uuid | FieldKind::OptionalUuid => {
            let ok = value
                .as_str()
                .is_some_and(|s| Uuid::parse_str(s).is_ok());
            if !ok {
                return Err(invalid(record, path.to_string(), "must be a UUID string"));
            }
        }
        FieldKind::Text => {
            if !value.as_str().is_some_and(|s| !s.trim().is_empty()) {
                return Err(invalid(record, path.to_string(), "must be a non-empty string"));
            }
        }
        FieldKind::OptionalText => {
            if !value.is_string() {
                return Err(invalid(record, path.to_string(), "must be a string"));
            }
        }
        FieldKind::Timestamp => {
            let ok = value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok());
            if !ok {
                return Err(invalid(record, path.to_string(), "must be an RFC 3339 timestamp"));
            }
        }
        FieldKind::OneOf(allowed) => {
            if !value.as_str().is_some_and(|s| allowed.contains(&s)) {
                let reason = format!("must be one of {}", allowed.join(", "));
                return Err(invalid(record, path.to_string(), &reason));
            }
        }
        FieldKind::TextList => {
            let items = value
                .as_array()
                .ok_or_else(|| invalid(record, path.to_string(), "must be an array of strings"))?;
            for (i, item) in items.iter().enumerate() {
                check_kind(record, &format!("{path}[{i}]"), FieldKind::Text, item)?;
            }
        }
        FieldKind::Count => {
            if !value.as_u64().is_some_and(|n| u32::try_from(n).is_ok()) {
                return Err(invalid(
                    record,
                    path.to_string(),
                    "must be an integer between 0 and 4294967295",
                ));
            }
        }
        FieldKind::List(schema) => {
            let items = value
                .as_array()
                .ok_or_else(|| invalid(record, path.to_string(), "must be an array"))?;
            for (i, item) in items.iter().enumerate() {
                validate_at(schema, item, &format!("{path}[{i}]"))?;
            }
        }
    }
    Ok(())
}

fn invalid(record: &'static str, field: String, reason: &str) -> SerializationError {
    SerializationError::InvalidField {
        record,
        field,
        reason: reason.to_string(),
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
