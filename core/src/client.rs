//! Typed operations against the foreign language courses service.
//!
//! # Design
//! Every operation is split three ways:
//! - `build_*` produces an `HttpRequest` (pure, no I/O);
//! - `parse_*` maps an `HttpResponse` to a domain value or `ApiError` (pure);
//! - the operation itself (`enroll`, `list_courses`, ...) sends the built
//!   request through the retrying transport and parses the result.
//!
//! `CoursesClient` carries no mutable state. The only shared resource is the
//! connection pool inside its transport, so a client can be cloned or shared
//! by reference across threads.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tracing::{debug, info};
use url::form_urlencoded;
use uuid::Uuid;

use crate::codec::{self, Record};
use crate::config::ClientConfig;
use crate::enrollment::{EnrollmentAttempt, EnrollmentEvent};
use crate::error::{ApiError, DomainError, SerializationError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, DEFAULT_REQUEST_TIMEOUT};
use crate::retry::{CancelToken, RetryPolicy, RetryingTransport, Sleeper, ThreadSleeper};
use crate::transport::{Transport, UreqTransport};
use crate::types::{
    CourseFilter, CoursePage, CourseRecord, EnrollmentRequest, EnrollmentResult, GroupRecord,
    NewCourse, NewGroup, NewStudent, Outcome, Rejection, StudentRecord,
};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const LIST_COURSES: &str = "list_courses";
const GET_COURSE: &str = "get_course";
const CREATE_COURSE: &str = "create_course";
const CREATE_STUDENT: &str = "create_student";
const CREATE_GROUP: &str = "create_group";
const ENROLL: &str = "enroll";
const CANCEL_ENROLLMENT: &str = "cancel_enrollment";

/// Client for the courses API.
#[derive(Debug, Clone)]
pub struct CoursesClient<T = UreqTransport, S = ThreadSleeper> {
    base_url: String,
    request_timeout: Duration,
    transport: RetryingTransport<T, S>,
}

impl CoursesClient {
    /// A client with default timeouts and retry policy and a fresh pool.
    pub fn new(base_url: &str) -> Self {
        Self::from_config(&ClientConfig {
            base_url: base_url.to_string(),
            ..ClientConfig::default()
        })
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let transport = UreqTransport::new(config.connect_timeout());
        Self::with_transport(
            &config.base_url,
            RetryingTransport::new(transport, config.retry_policy()),
        )
        .with_request_timeout(config.request_timeout())
    }
}

impl<T: Transport> CoursesClient<T, ThreadSleeper> {
    /// A client over any transport with the given retry policy.
    pub fn over(base_url: &str, transport: T, policy: RetryPolicy) -> Self {
        Self::with_transport(base_url, RetryingTransport::new(transport, policy))
    }
}

impl<T: Transport, S: Sleeper> CoursesClient<T, S> {
    pub fn with_transport(base_url: &str, transport: RetryingTransport<T, S>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            transport,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &RetryingTransport<T, S> {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Request builders
    // -----------------------------------------------------------------------

    pub fn build_list_courses(&self, filter: &CourseFilter, page: u32) -> HttpRequest {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("page", &page.to_string());
        query.append_pair("size", &filter.page_size.to_string());
        if let Some(language) = &filter.language {
            query.append_pair("language", language);
        }
        if let Some(level) = filter.level {
            query.append_pair("level", level.as_str());
        }
        self.request(
            HttpMethod::Get,
            format!("{}/courses?{}", self.base_url, query.finish()),
        )
    }

    pub fn build_get_course(&self, id: Uuid) -> HttpRequest {
        self.request(HttpMethod::Get, format!("{}/courses/{id}", self.base_url))
    }

    pub fn build_create_course(&self, input: &NewCourse) -> Result<HttpRequest, ApiError> {
        self.json_request(CREATE_COURSE, format!("{}/courses", self.base_url), input)
    }

    pub fn build_create_student(&self, input: &NewStudent) -> Result<HttpRequest, ApiError> {
        self.json_request(CREATE_STUDENT, format!("{}/students", self.base_url), input)
    }

    pub fn build_create_group(&self, input: &NewGroup) -> Result<HttpRequest, ApiError> {
        self.json_request(CREATE_GROUP, format!("{}/groups", self.base_url), input)
    }

    /// The idempotency key travels both in the body and as a header.
    pub fn build_enroll(&self, input: &EnrollmentRequest) -> Result<HttpRequest, ApiError> {
        let request = self.json_request(ENROLL, format!("{}/enrollments", self.base_url), input)?;
        Ok(request.with_header(IDEMPOTENCY_HEADER, input.idempotency_key.to_string()))
    }

    pub fn build_cancel_enrollment(&self, id: Uuid) -> HttpRequest {
        self.request(
            HttpMethod::Delete,
            format!("{}/enrollments/{id}", self.base_url),
        )
    }

    // -----------------------------------------------------------------------
    // Response parsers
    // -----------------------------------------------------------------------

    pub fn parse_list_courses(&self, response: HttpResponse) -> Result<CoursePage, ApiError> {
        check_status(LIST_COURSES, &response, &[200])?;
        decode(LIST_COURSES, &response)
    }

    pub fn parse_get_course(&self, id: Uuid, response: HttpResponse) -> Result<CourseRecord, ApiError> {
        if response.status == 404 {
            return Err(not_found(GET_COURSE, "course", id));
        }
        check_status(GET_COURSE, &response, &[200])?;
        decode(GET_COURSE, &response)
    }

    pub fn parse_create_course(&self, response: HttpResponse) -> Result<CourseRecord, ApiError> {
        check_status(CREATE_COURSE, &response, &[200, 201])?;
        decode(CREATE_COURSE, &response)
    }

    pub fn parse_create_student(&self, response: HttpResponse) -> Result<StudentRecord, ApiError> {
        check_status(CREATE_STUDENT, &response, &[200, 201])?;
        decode(CREATE_STUDENT, &response)
    }

    pub fn parse_create_group(
        &self,
        input: &NewGroup,
        response: HttpResponse,
    ) -> Result<GroupRecord, ApiError> {
        if response.status == 404 {
            return Err(not_found(CREATE_GROUP, "course", input.course_id));
        }
        check_status(CREATE_GROUP, &response, &[200, 201])?;
        decode(CREATE_GROUP, &response)
    }

    /// 200 (a replay of an earlier request) and 201 both carry the result.
    /// Any 4xx, or a 2xx whose outcome is `rejected`, is a rejection.
    pub fn parse_enroll(
        &self,
        input: &EnrollmentRequest,
        response: HttpResponse,
    ) -> Result<EnrollmentResult, ApiError> {
        let rejected = |status: u16, reason: String| {
            ApiError::Domain(DomainError::EnrollmentRejected {
                student_id: input.student_id,
                course_id: input.course_id,
                status,
                reason,
            })
        };

        if (400..500).contains(&response.status) {
            return Err(rejected(response.status, rejection_reason(&response)));
        }
        check_status(ENROLL, &response, &[200, 201])?;
        let result: EnrollmentResult = decode(ENROLL, &response)?;
        if result.outcome == Outcome::Rejected {
            let reason = result.reason.unwrap_or_else(|| "no reason given".to_string());
            return Err(rejected(response.status, reason));
        }
        Ok(result)
    }

    pub fn parse_cancel_enrollment(&self, id: Uuid, response: HttpResponse) -> Result<(), ApiError> {
        if response.status == 404 {
            return Err(not_found(CANCEL_ENROLLMENT, "enrollment", id));
        }
        check_status(CANCEL_ENROLLMENT, &response, &[200, 204])
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Lazily page through the course catalogue.
    pub fn list_courses(&self, filter: CourseFilter) -> CoursePages<'_, T, S> {
        CoursePages {
            client: self,
            filter,
            cancel: CancelToken::new(),
            next_page: 0,
            buffer: VecDeque::new(),
            seen: HashSet::new(),
            done: false,
        }
    }

    /// Fetch one page of courses.
    pub fn fetch_course_page(
        &self,
        filter: &CourseFilter,
        page: u32,
        cancel: &CancelToken,
    ) -> Result<CoursePage, ApiError> {
        let request = self.build_list_courses(filter, page);
        let response = self.send(LIST_COURSES, &request, cancel)?;
        let parsed = self.parse_list_courses(response)?;
        if parsed.page != page {
            return Err(ApiError::serialization(
                LIST_COURSES,
                SerializationError::InvalidField {
                    record: "CoursePage",
                    field: "page".to_string(),
                    reason: format!("is {} but page {page} was requested", parsed.page),
                },
            ));
        }
        debug!(page, items = parsed.items.len(), "fetched course page");
        Ok(parsed)
    }

    pub fn get_course(&self, id: Uuid) -> Result<CourseRecord, ApiError> {
        let request = self.build_get_course(id);
        let response = self.send(GET_COURSE, &request, &CancelToken::new())?;
        self.parse_get_course(id, response)
    }

    pub fn create_course(&self, input: &NewCourse) -> Result<CourseRecord, ApiError> {
        let request = self.build_create_course(input)?;
        let response = self.send(CREATE_COURSE, &request, &CancelToken::new())?;
        let course = self.parse_create_course(response)?;
        debug!(course_id = %course.id, "created course");
        Ok(course)
    }

    pub fn create_student(&self, input: &NewStudent) -> Result<StudentRecord, ApiError> {
        let request = self.build_create_student(input)?;
        let response = self.send(CREATE_STUDENT, &request, &CancelToken::new())?;
        let student = self.parse_create_student(response)?;
        debug!(student_id = %student.id, "created student");
        Ok(student)
    }

    pub fn create_group(&self, input: &NewGroup) -> Result<GroupRecord, ApiError> {
        let request = self.build_create_group(input)?;
        let response = self.send(CREATE_GROUP, &request, &CancelToken::new())?;
        let group = self.parse_create_group(input, response)?;
        debug!(group_id = %group.id, course_id = %group.course_id, "created group");
        Ok(group)
    }

    /// Enroll a student. Resending the same `EnrollmentRequest` (same
    /// idempotency key) converges on the same result.
    pub fn enroll(&self, input: &EnrollmentRequest) -> Result<EnrollmentResult, ApiError> {
        self.enroll_with_cancel(input, &CancelToken::new())
    }

    pub fn enroll_with_cancel(
        &self,
        input: &EnrollmentRequest,
        cancel: &CancelToken,
    ) -> Result<EnrollmentResult, ApiError> {
        let mut attempt = EnrollmentAttempt::new(input);
        let request = match self.build_enroll(input) {
            Ok(request) => request,
            Err(e) => {
                attempt.apply(EnrollmentEvent::Failed);
                return Err(e);
            }
        };
        attempt.apply(EnrollmentEvent::Dispatched);

        let exchange = match self.transport.execute(&request, cancel) {
            Ok(exchange) => exchange,
            Err(e) => {
                let event = match &e {
                    TransportError::Exhausted { attempts, .. } => {
                        attempt.record_attempts(*attempts);
                        EnrollmentEvent::Exhausted
                    }
                    _ => EnrollmentEvent::Failed,
                };
                attempt.apply(event);
                return Err(ApiError::from_transport(ENROLL, e));
            }
        };
        attempt.record_attempts(exchange.attempts);

        let result = self.parse_enroll(input, exchange.response);
        let event = match &result {
            Ok(_) => EnrollmentEvent::Confirmed,
            Err(ApiError::Domain(DomainError::EnrollmentRejected { .. })) => EnrollmentEvent::Rejected,
            Err(_) => EnrollmentEvent::Failed,
        };
        attempt.apply(event);
        result
    }

    /// Cancel an enrollment. A 404 is returned as `DomainError::NotFound`
    /// without any retry.
    pub fn cancel_enrollment(&self, id: Uuid) -> Result<(), ApiError> {
        self.cancel_enrollment_with_cancel(id, &CancelToken::new())
    }

    pub fn cancel_enrollment_with_cancel(&self, id: Uuid, cancel: &CancelToken) -> Result<(), ApiError> {
        let request = self.build_cancel_enrollment(id);
        let response = self.send(CANCEL_ENROLLMENT, &request, cancel)?;
        self.parse_cancel_enrollment(id, response)?;
        info!(enrollment_id = %id, "cancelled enrollment");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn request(&self, method: HttpMethod, path: String) -> HttpRequest {
        HttpRequest::new(method, path).with_timeout(self.request_timeout)
    }

    fn json_request<R: Record>(
        &self,
        operation: &'static str,
        path: String,
        input: &R,
    ) -> Result<HttpRequest, ApiError> {
        let body = codec::encode(input).map_err(|e| ApiError::serialization(operation, e))?;
        Ok(self.request(HttpMethod::Post, path).with_json_body(body))
    }

    fn send(
        &self,
        operation: &'static str,
        request: &HttpRequest,
        cancel: &CancelToken,
    ) -> Result<HttpResponse, ApiError> {
        self.transport
            .execute(request, cancel)
            .map(|exchange| exchange.response)
            .map_err(|e| ApiError::from_transport(operation, e))
    }
}

/// Lazy, restartable iterator over every course matching a filter.
///
/// Each page is one transport call. Iteration ends at the first empty page or
/// the first error. A course id seen twice in one pass is reported as an
/// error rather than yielded again.
pub struct CoursePages<'a, T, S> {
    client: &'a CoursesClient<T, S>,
    filter: CourseFilter,
    cancel: CancelToken,
    next_page: u32,
    buffer: VecDeque<CourseRecord>,
    seen: HashSet<Uuid>,
    done: bool,
}

impl<T: Transport, S: Sleeper> CoursePages<'_, T, S> {
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Start again from the first page.
    pub fn restart(&mut self) {
        self.next_page = 0;
        self.buffer.clear();
        self.seen.clear();
        self.done = false;
    }

    /// Pages fetched so far in this pass, the terminating empty page included.
    pub fn pages_fetched(&self) -> u32 {
        self.next_page
    }

    fn fetch_next(&mut self) -> Result<(), ApiError> {
        let page = self
            .client
            .fetch_course_page(&self.filter, self.next_page, &self.cancel)?;
        self.next_page += 1;
        if page.items.is_empty() {
            self.done = true;
            return Ok(());
        }
        for (i, course) in page.items.into_iter().enumerate() {
            if !self.seen.insert(course.id) {
                return Err(ApiError::serialization(
                    LIST_COURSES,
                    SerializationError::InvalidField {
                        record: "CoursePage",
                        field: format!("items[{i}].id"),
                        reason: format!("repeats course {} from an earlier page", course.id),
                    },
                ));
            }
            self.buffer.push_back(course);
        }
        Ok(())
    }
}

impl<T: Transport, S: Sleeper> Iterator for CoursePages<'_, T, S> {
    type Item = Result<CourseRecord, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(course) = self.buffer.pop_front() {
                return Some(Ok(course));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_next() {
                self.done = true;
                self.buffer.clear();
                return Some(Err(e));
            }
        }
    }
}

/// Map a status outside `expected` to the appropriate `ApiError`.
fn check_status(operation: &'static str, response: &HttpResponse, expected: &[u16]) -> Result<(), ApiError> {
    if expected.contains(&response.status) {
        return Ok(());
    }
    if (400..500).contains(&response.status) {
        return Err(ApiError::Domain(DomainError::Rejected {
            operation,
            status: response.status,
            reason: rejection_reason(response),
        }));
    }
    Err(ApiError::UnexpectedStatus {
        operation,
        status: response.status,
        body: response.body_text(),
    })
}

fn decode<R: Record>(operation: &'static str, response: &HttpResponse) -> Result<R, ApiError> {
    codec::decode(&response.body).map_err(|e| ApiError::serialization(operation, e))
}

/// The service's `reason`, or the raw body when it did not send one.
fn rejection_reason(response: &HttpResponse) -> String {
    codec::decode::<Rejection>(&response.body)
        .map(|r| r.reason)
        .unwrap_or_else(|_| response.body_text())
}

fn not_found(operation: &'static str, resource: &'static str, id: Uuid) -> ApiError {
    ApiError::Domain(DomainError::NotFound {
        operation,
        resource,
        id,
    })
}
