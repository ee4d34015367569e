//! Verify build/parse methods against JSON test vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs, expected requests, simulated responses,
//! and expected parse results. Bodies are compared as parsed JSON so field
//! order never produces a false negative.

use courses_core::{
    ApiError, CourseFilter, CoursePage, CourseRecord, CoursesClient, DomainError,
    EnrollmentRequest, EnrollmentResult, HttpMethod, HttpRequest, HttpResponse, Level,
};
use serde_json::Value;
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:8080/api";

fn client() -> CoursesClient {
    CoursesClient::new(BASE_URL)
}

fn load(raw: &str) -> Vec<Value> {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn simulated_response(case: &Value) -> HttpResponse {
    let sim = &case["simulated_response"];
    HttpResponse::new(
        sim["status"].as_u64().unwrap() as u16,
        sim["body"].as_str().unwrap().as_bytes().to_vec(),
    )
}

/// Method and path always; headers and body only when the vector lists them.
fn assert_request(name: &str, req: &HttpRequest, expected: &Value) {
    assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
    assert_eq!(req.path, format!("{BASE_URL}{}", expected["path"].as_str().unwrap()), "{name}: path");

    if let Some(headers) = expected.get("headers") {
        let expected_headers: Vec<(String, String)> = headers
            .as_array()
            .unwrap()
            .iter()
            .map(|h| {
                let pair = h.as_array().unwrap();
                (pair[0].as_str().unwrap().to_string(), pair[1].as_str().unwrap().to_string())
            })
            .collect();
        assert_eq!(req.headers, expected_headers, "{name}: headers");
    }

    match expected.get("body") {
        Some(body) => {
            let sent: Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
            let wanted: Value = serde_json::from_str(body.as_str().unwrap()).unwrap();
            assert_eq!(sent, wanted, "{name}: body");
        }
        None => assert!(req.body.is_none(), "{name}: body should be None"),
    }
}

fn assert_error(name: &str, err: ApiError, expected: &Value) {
    match expected["kind"].as_str().unwrap() {
        "NotFound" => assert!(err.is_not_found(), "{name}: expected NotFound, got {err:?}"),
        "Serialization" => match err {
            ApiError::Serialization { source, .. } => {
                assert_eq!(source.field(), expected["field"].as_str(), "{name}: field");
            }
            other => panic!("{name}: expected Serialization, got {other:?}"),
        },
        "EnrollmentRejected" => match err {
            ApiError::Domain(DomainError::EnrollmentRejected { reason, .. }) => {
                assert_eq!(reason, expected["reason"].as_str().unwrap(), "{name}: reason");
            }
            other => panic!("{name}: expected EnrollmentRejected, got {other:?}"),
        },
        other => panic!("{name}: unknown expected_error: {other}"),
    }
}

fn filter_from(value: &Value) -> CourseFilter {
    CourseFilter {
        language: value["language"].as_str().map(str::to_string),
        level: value["level"].as_str().map(|l| l.parse::<Level>().unwrap()),
        page_size: value["pageSize"].as_u64().unwrap() as u32,
    }
}

// ---------------------------------------------------------------------------
// List courses
// ---------------------------------------------------------------------------

#[test]
fn list_courses_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/list_courses.json")) {
        let name = case["name"].as_str().unwrap();
        let filter = filter_from(&case["filter"]);
        let page = case["page"].as_u64().unwrap() as u32;

        let req = c.build_list_courses(&filter, page);
        assert_request(name, &req, &case["expected_request"]);

        let result = c.parse_list_courses(simulated_response(&case));
        if let Some(expected_error) = case.get("expected_error") {
            assert_error(name, result.unwrap_err(), expected_error);
        } else {
            let expected: CoursePage = serde_json::from_value(case["expected_result"].clone()).unwrap();
            assert_eq!(result.unwrap(), expected, "{name}: parsed result");
        }
    }
}

// ---------------------------------------------------------------------------
// Get course
// ---------------------------------------------------------------------------

#[test]
fn get_course_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/get_course.json")) {
        let name = case["name"].as_str().unwrap();
        let id: Uuid = case["input_id"].as_str().unwrap().parse().unwrap();

        let req = c.build_get_course(id);
        assert_request(name, &req, &case["expected_request"]);

        let result = c.parse_get_course(id, simulated_response(&case));
        if let Some(expected_error) = case.get("expected_error") {
            assert_error(name, result.unwrap_err(), expected_error);
        } else {
            let expected: CourseRecord = serde_json::from_value(case["expected_result"].clone()).unwrap();
            assert_eq!(result.unwrap(), expected, "{name}: parsed result");
        }
    }
}

// ---------------------------------------------------------------------------
// Enroll
// ---------------------------------------------------------------------------

#[test]
fn enroll_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/enroll.json")) {
        let name = case["name"].as_str().unwrap();
        let input: EnrollmentRequest = serde_json::from_value(case["input"].clone()).unwrap();

        let req = c.build_enroll(&input).unwrap();
        assert_request(name, &req, &case["expected_request"]);

        let result = c.parse_enroll(&input, simulated_response(&case));
        if let Some(expected_error) = case.get("expected_error") {
            assert_error(name, result.unwrap_err(), expected_error);
        } else {
            let expected: EnrollmentResult = serde_json::from_value(case["expected_result"].clone()).unwrap();
            assert_eq!(result.unwrap(), expected, "{name}: parsed result");
        }
    }
}

// ---------------------------------------------------------------------------
// Cancel enrollment
// ---------------------------------------------------------------------------

#[test]
fn cancel_enrollment_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/cancel_enrollment.json")) {
        let name = case["name"].as_str().unwrap();
        let id: Uuid = case["input_id"].as_str().unwrap().parse().unwrap();

        let req = c.build_cancel_enrollment(id);
        assert_request(name, &req, &case["expected_request"]);

        let result = c.parse_cancel_enrollment(id, simulated_response(&case));
        if let Some(expected_error) = case.get("expected_error") {
            assert_error(name, result.unwrap_err(), expected_error);
        } else {
            assert!(result.is_ok(), "{name}: expected success");
        }
    }
}
