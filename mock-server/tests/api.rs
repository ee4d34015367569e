use axum::http::{self, Request, StatusCode};
use axum::Router;
use courses_mock::{app, app_with_store, Course, Db, Group, Stats, Student};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

async fn call(app: &Router, request: Request<String>) -> axum::response::Response {
    app.clone().oneshot(request).await.unwrap()
}

fn course_body(title: &str, language: &str, capacity: usize) -> String {
    json!({
        "title": title,
        "description": "Conversation practice",
        "language": language,
        "level": "A2",
        "schedule": "Mon-Wed-Fri 10:00",
        "createdAt": "2024-03-01T09:00:00Z",
        "capacity": capacity,
    })
    .to_string()
}

async fn create_course(app: &Router, title: &str, language: &str, capacity: usize) -> Course {
    let resp = call(app, json_request("POST", "/api/courses", &course_body(title, language, capacity))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await
}

async fn create_student(app: &Router, first_name: &str) -> Student {
    let body = json!({
        "firstName": first_name,
        "lastName": "Tester",
        "email": format!("{first_name}@example.com"),
        "registeredAt": "2024-03-01T09:00:00Z",
    });
    let resp = call(app, json_request("POST", "/api/students", &body.to_string())).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await
}

fn enrollment_request(student_id: Uuid, course_id: Uuid, key: Uuid) -> Request<String> {
    let body = json!({
        "studentId": student_id,
        "courseId": course_id,
        "requestedAt": "2024-03-02T10:00:00Z",
        "idempotencyKey": key,
    });
    Request::builder()
        .method("POST")
        .uri("/api/enrollments")
        .header(http::header::CONTENT_TYPE, "application/json")
        .header("Idempotency-Key", key.to_string())
        .body(body.to_string())
        .unwrap()
}

// --- courses ---

#[tokio::test]
async fn list_courses_empty() {
    let resp = call(&app(), get("/api/courses")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page: Value = body_json(resp).await;
    assert_eq!(page["items"], json!([]));
    assert_eq!(page["page"], 0);
}

#[tokio::test]
async fn create_course_returns_201() {
    let app = app();
    let course = create_course(&app, "Spanish for beginners", "Spanish", 10).await;
    assert_eq!(course.title, "Spanish for beginners");
    assert_eq!(course.level, "A2");

    let resp = call(&app, get(&format!("/api/courses/{}", course.id))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let fetched: Course = body_json(resp).await;
    assert_eq!(fetched, course);
}

#[tokio::test]
async fn create_course_with_unknown_level_returns_422() {
    let body = course_body("x", "Greek", 3).replace("A2", "Z9");
    let resp = call(&app(), json_request("POST", "/api/courses", &body)).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn get_course_not_found() {
    let resp = call(&app(), get("/api/courses/00000000-0000-0000-0000-000000000000")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_course_bad_uuid_returns_400() {
    let resp = call(&app(), get("/api/courses/not-a-uuid")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_courses_pages_in_creation_order() {
    let app = app();
    let mut created = Vec::new();
    for n in 0..5 {
        created.push(create_course(&app, &format!("Course {n}"), "Italian", 10).await.id);
    }

    let mut seen = Vec::new();
    for page in 0.. {
        let resp = call(&app, get(&format!("/api/courses?page={page}&size=2"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = body_json(resp).await;
        let items: Vec<Course> = serde_json::from_value(body["items"].clone()).unwrap();
        if items.is_empty() {
            break;
        }
        seen.extend(items.into_iter().map(|c| c.id));
    }
    assert_eq!(seen, created);
}

#[tokio::test]
async fn list_courses_filters_by_language() {
    let app = app();
    create_course(&app, "German 1", "German", 10).await;
    create_course(&app, "French 1", "French", 10).await;

    let resp = call(&app, get("/api/courses?language=French")).await;
    let body: Value = body_json(resp).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["language"], "French");
}

#[tokio::test]
async fn list_courses_rejects_zero_size() {
    let resp = call(&app(), get("/api/courses?size=0")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- students and groups ---

#[tokio::test]
async fn create_student_requires_valid_email() {
    let body = json!({
        "firstName": "Ivan",
        "lastName": "Petrov",
        "email": "not-an-email",
        "registeredAt": "2024-03-01T09:00:00Z",
    });
    let resp = call(&app(), json_request("POST", "/api/students", &body.to_string())).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn create_group_for_unknown_course_returns_404() {
    let body = json!({
        "name": "Evening Group",
        "courseId": Uuid::new_v4(),
        "schedule": ["Tue-Thu 18:00"],
    });
    let resp = call(&app(), json_request("POST", "/api/groups", &body.to_string())).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_group_returns_201() {
    let app = app();
    let course = create_course(&app, "Korean", "Korean", 10).await;
    let body = json!({
        "name": "Morning Group",
        "courseId": course.id,
        "schedule": ["Mon-Wed-Fri 9:00", "Tue-Thu 11:00"],
    });
    let resp = call(&app, json_request("POST", "/api/groups", &body.to_string())).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let group: Group = body_json(resp).await;
    assert_eq!(group.course_id, course.id);
    assert_eq!(group.schedule.len(), 2);
}

// --- enrollments ---

#[tokio::test]
async fn enroll_then_replay_same_key() {
    let db = Db::default();
    let app = app_with_store(db.clone());
    let course = create_course(&app, "Arabic", "Arabic", 10).await;
    let student = create_student(&app, "Lena").await;
    let key = Uuid::new_v4();

    let first = call(&app, enrollment_request(student.id, course.id, key)).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: Value = body_json(first).await;
    assert_eq!(first["outcome"], "confirmed");

    let replay = call(&app, enrollment_request(student.id, course.id, key)).await;
    assert_eq!(replay.status(), StatusCode::OK);
    let replay: Value = body_json(replay).await;
    assert_eq!(replay, first);

    assert_eq!(db.read().await.stats().enrollments_created, 1);
}

#[tokio::test]
async fn enroll_twice_with_new_key_is_conflict() {
    let app = app();
    let course = create_course(&app, "Hindi", "Hindi", 10).await;
    let student = create_student(&app, "Ravi").await;

    let first = call(&app, enrollment_request(student.id, course.id, Uuid::new_v4())).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let second = call(&app, enrollment_request(student.id, course.id, Uuid::new_v4())).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body: Value = body_json(second).await;
    assert_eq!(body["reason"], "duplicate enrollment");
}

#[tokio::test]
async fn enroll_with_mismatched_header_is_bad_request() {
    let app = app();
    let mut request = enrollment_request(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    request
        .headers_mut()
        .insert("Idempotency-Key", Uuid::new_v4().to_string().parse().unwrap());
    let resp = call(&app, request).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn fault_after_commit_still_records_once() {
    let db = Db::default();
    let app = app_with_store(db.clone());
    let course = create_course(&app, "Turkish", "Turkish", 10).await;
    let student = create_student(&app, "Deniz").await;
    let key = Uuid::new_v4();

    let resp = call(&app, json_request("POST", "/api/_faults", r#"{"failAfterCommit":1}"#)).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let failed = call(&app, enrollment_request(student.id, course.id, key)).await;
    assert_eq!(failed.status(), StatusCode::SERVICE_UNAVAILABLE);
    let retried = call(&app, enrollment_request(student.id, course.id, key)).await;
    assert_eq!(retried.status(), StatusCode::OK);

    let resp = call(&app, get("/api/_stats")).await;
    let stats: Stats = body_json(resp).await;
    assert_eq!(stats.enrollments, 1);
    assert_eq!(stats.enroll_requests, 2);
}

#[tokio::test]
async fn cancel_enrollment_lifecycle() {
    let app = app();
    let course = create_course(&app, "Dutch", "Dutch", 10).await;
    let student = create_student(&app, "Sem").await;
    let resp = call(&app, enrollment_request(student.id, course.id, Uuid::new_v4())).await;
    let result: Value = body_json(resp).await;
    let id = result["enrollmentId"].as_str().unwrap().to_string();

    let delete = |id: &str| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/enrollments/{id}"))
            .body(String::new())
            .unwrap()
    };
    let resp = call(&app, delete(&id)).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    let resp = call(&app, delete(&id)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
