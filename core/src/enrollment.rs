//! Lifecycle of a single enrollment attempt.
//!
//! ```text
//! Building --dispatched--> Sent --confirmed--> Confirmed
//!     |                      |---rejected---> Rejected
//!     |                      |---exhausted--> Exhausted
//!     '------failed----------'---failed-----> Failed
//! ```
//!
//! `Confirmed` means the service accepted the request (its outcome may still
//! be `pending`). `Failed` covers everything that is neither an answer from
//! the service nor a spent retry budget: cancellation, an unsendable request,
//! an unreadable response.

use tracing::{debug, info, warn};

use crate::types::{EnrollmentRequest, IdempotencyKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentState {
    Building,
    Sent,
    Confirmed,
    Rejected,
    Exhausted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentEvent {
    Dispatched,
    Confirmed,
    Rejected,
    Exhausted,
    Failed,
}

impl EnrollmentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EnrollmentState::Confirmed
                | EnrollmentState::Rejected
                | EnrollmentState::Exhausted
                | EnrollmentState::Failed
        )
    }

    /// The state reached from `self` on `event`, or `None` if the event is
    /// not allowed here.
    pub fn on(self, event: EnrollmentEvent) -> Option<EnrollmentState> {
        use EnrollmentEvent as E;
        use EnrollmentState as S;
        match (self, event) {
            (S::Building, E::Dispatched) => Some(S::Sent),
            (S::Building, E::Failed) => Some(S::Failed),
            (S::Sent, E::Confirmed) => Some(S::Confirmed),
            (S::Sent, E::Rejected) => Some(S::Rejected),
            (S::Sent, E::Exhausted) => Some(S::Exhausted),
            (S::Sent, E::Failed) => Some(S::Failed),
            _ => None,
        }
    }
}

/// Tracks one `enroll` call through its states and logs each transition.
#[derive(Debug)]
pub struct EnrollmentAttempt {
    key: IdempotencyKey,
    state: EnrollmentState,
    attempts: u32,
}

impl EnrollmentAttempt {
    pub fn new(request: &EnrollmentRequest) -> Self {
        debug!(
            key = %request.idempotency_key,
            student_id = %request.student_id,
            course_id = %request.course_id,
            "building enrollment"
        );
        Self {
            key: request.idempotency_key,
            state: EnrollmentState::Building,
            attempts: 0,
        }
    }

    pub fn state(&self) -> EnrollmentState {
        self.state
    }

    /// Transport attempts spent so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn record_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
    }

    /// Apply `event`; an event that is not allowed leaves the state as is.
    pub fn apply(&mut self, event: EnrollmentEvent) -> EnrollmentState {
        match self.state.on(event) {
            Some(next) => {
                if next.is_terminal() {
                    info!(key = %self.key, attempts = self.attempts, state = ?next, "enrollment settled");
                } else {
                    debug!(key = %self.key, state = ?next, "enrollment sent");
                }
                self.state = next;
            }
            None => {
                warn!(key = %self.key, state = ?self.state, event = ?event, "ignored enrollment event");
            }
        }
        self.state
    }
}
