//! In-memory stand-in for the foreign language courses service.
//!
//! Serves the same JSON contract as the real service under `/api` and adds
//! two test hooks: `POST /api/_faults` to make upcoming enrollment calls
//! answer 503 (before or after committing), and `GET /api/_stats` to count
//! what was actually stored.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 25;
pub const MAX_PAGE_SIZE: usize = 100;

const LEVELS: [&str; 6] = ["A1", "A2", "B1", "B2", "C1", "C2"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub language: String,
    pub level: String,
    pub schedule: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub language: String,
    pub level: String,
    pub schedule: String,
    pub created_at: DateTime<Utc>,
    /// Seats available; not part of the public record.
    pub capacity: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub course_id: Uuid,
    pub schedule: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    pub name: String,
    pub course_id: Uuid,
    pub schedule: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEnrollment {
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub requested_at: DateTime<Utc>,
    pub idempotency_key: Uuid,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub requested_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Faults {
    /// Answer 503 to this many upcoming enrollment calls without processing.
    pub fail_next: u32,
    /// Process this many upcoming enrollment calls, then answer 503 anyway.
    pub fail_after_commit: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Enrollments currently held.
    pub enrollments: usize,
    /// Enrollments ever created.
    pub enrollments_created: u64,
    /// Enrollment calls received, faulted ones included.
    pub enroll_requests: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub page: usize,
    pub size: usize,
    pub language: Option<String>,
    pub level: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 0,
            size: 20,
            language: None,
            level: None,
        }
    }
}

/// A stored answer, replayed verbatim for a repeated idempotency key.
#[derive(Clone, Debug)]
struct Answer {
    status: StatusCode,
    body: serde_json::Value,
}

impl IntoResponse for Answer {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Default)]
pub struct Store {
    courses: Vec<(Course, usize)>,
    students: HashMap<Uuid, Student>,
    groups: HashMap<Uuid, Group>,
    enrollments: HashMap<Uuid, Enrollment>,
    answers: HashMap<Uuid, Answer>,
    faults: Faults,
    stats: Stats,
}

impl Store {
    pub fn stats(&self) -> Stats {
        Stats {
            enrollments: self.enrollments.len(),
            ..self.stats
        }
    }

    /// Replace the pending fault injection.
    pub fn set_faults(&mut self, faults: Faults) {
        self.faults = faults;
    }

    fn course(&self, id: Uuid) -> Option<&(Course, usize)> {
        self.courses.iter().find(|(course, _)| course.id == id)
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with_store(Db::default())
}

/// Router over a caller-owned store, so tests can inspect it directly.
pub fn app_with_store(db: Db) -> Router {
    let api = Router::new()
        .route("/courses", get(list_courses).post(create_course))
        .route("/courses/{id}", get(get_course))
        .route("/students", post(create_student))
        .route("/groups", post(create_group))
        .route("/enrollments", post(enroll))
        .route("/enrollments/{id}", delete(cancel_enrollment))
        .route("/_faults", post(set_faults))
        .route("/_stats", get(stats));
    Router::new().nest("/api", api).with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_store(listener, Db::default()).await
}

pub async fn run_with_store(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "courses mock listening");
    }
    axum::serve(listener, app_with_store(db)).await
}

fn reject(status: StatusCode, reason: &str) -> Response {
    (status, Json(json!({ "reason": reason }))).into_response()
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

async fn list_courses(State(db): State<Db>, Query(params): Query<ListParams>) -> Response {
    if params.size == 0 || params.size > MAX_PAGE_SIZE {
        return reject(StatusCode::BAD_REQUEST, "size must be between 1 and 100");
    }
    let store = db.read().await;
    let items: Vec<Course> = store
        .courses
        .iter()
        .map(|(course, _)| course)
        .filter(|c| params.language.as_ref().is_none_or(|l| &c.language == l))
        .filter(|c| params.level.as_ref().is_none_or(|l| &c.level == l))
        .skip(params.page.saturating_mul(params.size))
        .take(params.size)
        .cloned()
        .collect();
    debug!(page = params.page, items = items.len(), "listed courses");
    Json(json!({ "items": items, "page": params.page })).into_response()
}

async fn create_course(State(db): State<Db>, Json(input): Json<NewCourse>) -> Response {
    if blank(&input.title) || blank(&input.language) || blank(&input.schedule) {
        return reject(StatusCode::UNPROCESSABLE_ENTITY, "title, language and schedule are required");
    }
    if !LEVELS.contains(&input.level.as_str()) {
        return reject(StatusCode::UNPROCESSABLE_ENTITY, "unknown level");
    }
    let course = Course {
        id: Uuid::new_v4(),
        title: input.title,
        language: input.language,
        level: input.level,
        schedule: input.schedule,
    };
    let capacity = input.capacity.unwrap_or(DEFAULT_CAPACITY);
    db.write().await.courses.push((course.clone(), capacity));
    debug!(course_id = %course.id, "created course");
    (StatusCode::CREATED, Json(course)).into_response()
}

async fn get_course(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<Json<Course>, StatusCode> {
    let store = db.read().await;
    store
        .course(id)
        .map(|(course, _)| Json(course.clone()))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_student(State(db): State<Db>, Json(input): Json<NewStudent>) -> Response {
    if blank(&input.first_name) || blank(&input.last_name) || !input.email.contains('@') {
        return reject(StatusCode::UNPROCESSABLE_ENTITY, "name and a valid email are required");
    }
    let student = Student {
        id: Uuid::new_v4(),
        first_name: input.first_name,
        last_name: input.last_name,
        email: input.email,
        registered_at: input.registered_at,
    };
    db.write().await.students.insert(student.id, student.clone());
    (StatusCode::CREATED, Json(student)).into_response()
}

async fn create_group(State(db): State<Db>, Json(input): Json<NewGroup>) -> Response {
    let mut store = db.write().await;
    if store.course(input.course_id).is_none() {
        return reject(StatusCode::NOT_FOUND, "unknown course");
    }
    if blank(&input.name) {
        return reject(StatusCode::UNPROCESSABLE_ENTITY, "name is required");
    }
    let group = Group {
        id: Uuid::new_v4(),
        name: input.name,
        course_id: input.course_id,
        schedule: input.schedule,
    };
    store.groups.insert(group.id, group.clone());
    (StatusCode::CREATED, Json(group)).into_response()
}

async fn enroll(State(db): State<Db>, headers: HeaderMap, Json(input): Json<NewEnrollment>) -> Response {
    let key = match headers.get("idempotency-key").map(|v| v.to_str()) {
        Some(Ok(raw)) => match Uuid::parse_str(raw) {
            Ok(key) if key == input.idempotency_key => key,
            _ => return reject(StatusCode::BAD_REQUEST, "Idempotency-Key header does not match body"),
        },
        Some(Err(_)) => return reject(StatusCode::BAD_REQUEST, "Idempotency-Key header is not text"),
        None => input.idempotency_key,
    };

    let mut store = db.write().await;
    store.stats.enroll_requests += 1;

    if store.faults.fail_next > 0 {
        store.faults.fail_next -= 1;
        debug!(%key, "injected failure before commit");
        return reject(StatusCode::SERVICE_UNAVAILABLE, "try again later");
    }

    if let Some(previous) = store.answers.get(&key) {
        debug!(%key, "replaying stored answer");
        let mut replay = previous.clone();
        if replay.status == StatusCode::CREATED {
            replay.status = StatusCode::OK;
        }
        return replay.into_response();
    }

    let answer = decide(&mut store, &input);
    store.answers.insert(key, answer.clone());

    if store.faults.fail_after_commit > 0 {
        store.faults.fail_after_commit -= 1;
        debug!(%key, "injected failure after commit");
        return reject(StatusCode::SERVICE_UNAVAILABLE, "try again later");
    }
    answer.into_response()
}

/// Apply the enrollment rules and record a new enrollment if they pass.
fn decide(store: &mut Store, input: &NewEnrollment) -> Answer {
    let rejected = |status: StatusCode, reason: &str| Answer {
        status,
        body: json!({ "reason": reason }),
    };

    let Some((_, capacity)) = store.course(input.course_id) else {
        return rejected(StatusCode::UNPROCESSABLE_ENTITY, "unknown course");
    };
    let capacity = *capacity;
    if !store.students.contains_key(&input.student_id) {
        return rejected(StatusCode::UNPROCESSABLE_ENTITY, "unknown student");
    }

    let mut taken = 0;
    for enrollment in store.enrollments.values() {
        if enrollment.course_id != input.course_id {
            continue;
        }
        if enrollment.student_id == input.student_id {
            return rejected(StatusCode::CONFLICT, "duplicate enrollment");
        }
        taken += 1;
    }
    if taken >= capacity {
        return rejected(StatusCode::CONFLICT, "course full");
    }

    let enrollment = Enrollment {
        id: Uuid::new_v4(),
        student_id: input.student_id,
        course_id: input.course_id,
        requested_at: input.requested_at,
    };
    let id = enrollment.id;
    store.enrollments.insert(id, enrollment);
    store.stats.enrollments_created += 1;
    info!(enrollment_id = %id, student_id = %input.student_id, course_id = %input.course_id, "enrolled");

    Answer {
        status: StatusCode::CREATED,
        body: json!({ "enrollmentId": id, "outcome": "confirmed", "reason": null }),
    }
}

async fn cancel_enrollment(State(db): State<Db>, Path(id): Path<Uuid>) -> StatusCode {
    let mut store = db.write().await;
    match store.enrollments.remove(&id) {
        Some(_) => {
            info!(enrollment_id = %id, "cancelled enrollment");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn set_faults(State(db): State<Db>, Json(faults): Json<Faults>) -> StatusCode {
    db.write().await.set_faults(faults);
    StatusCode::NO_CONTENT
}

async fn stats(State(db): State<Db>) -> Json<Stats> {
    Json(db.read().await.stats())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_enrollment(student_id: Uuid, course_id: Uuid) -> NewEnrollment {
        NewEnrollment {
            student_id,
            course_id,
            requested_at: Utc::now(),
            idempotency_key: Uuid::new_v4(),
        }
    }

    fn seeded(capacity: usize) -> (Store, Uuid, Uuid) {
        let mut store = Store::default();
        let course = Course {
            id: Uuid::new_v4(),
            title: "Japanese".to_string(),
            language: "Japanese".to_string(),
            level: "A1".to_string(),
            schedule: "Thu 19:00".to_string(),
        };
        let course_id = course.id;
        store.courses.push((course, capacity));
        let student = Student {
            id: Uuid::new_v4(),
            first_name: "Ada".to_string(),
            last_name: "Byron".to_string(),
            email: "ada@example.com".to_string(),
            registered_at: Utc::now(),
        };
        let student_id = student.id;
        store.students.insert(student_id, student);
        (store, student_id, course_id)
    }

    #[test]
    fn course_serializes_with_camel_case_fields() {
        let course = Course {
            id: Uuid::nil(),
            title: "French".to_string(),
            language: "French".to_string(),
            level: "B2".to_string(),
            schedule: "Mon".to_string(),
        };
        let json = serde_json::to_value(&course).unwrap();
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["level"], "B2");
        assert!(json.get("capacity").is_none());
    }

    #[test]
    fn decide_confirms_then_refuses_duplicates() {
        let (mut store, student_id, course_id) = seeded(5);
        let first = decide(&mut store, &new_enrollment(student_id, course_id));
        assert_eq!(first.status, StatusCode::CREATED);
        assert_eq!(first.body["outcome"], "confirmed");

        let second = decide(&mut store, &new_enrollment(student_id, course_id));
        assert_eq!(second.status, StatusCode::CONFLICT);
        assert_eq!(second.body["reason"], "duplicate enrollment");
        assert_eq!(store.stats().enrollments, 1);
    }

    #[test]
    fn decide_refuses_full_course() {
        let (mut store, student_id, course_id) = seeded(0);
        let answer = decide(&mut store, &new_enrollment(student_id, course_id));
        assert_eq!(answer.status, StatusCode::CONFLICT);
        assert_eq!(answer.body["reason"], "course full");
    }

    #[test]
    fn decide_refuses_unknown_references() {
        let (mut store, student_id, _) = seeded(5);
        let answer = decide(&mut store, &new_enrollment(student_id, Uuid::new_v4()));
        assert_eq!(answer.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(answer.body["reason"], "unknown course");
    }

    #[test]
    fn faults_default_to_none() {
        let faults: Faults = serde_json::from_str("{}").unwrap();
        assert_eq!(faults, Faults::default());
        let faults: Faults = serde_json::from_str(r#"{"failNext":2}"#).unwrap();
        assert_eq!(faults.fail_next, 2);
    }
}
