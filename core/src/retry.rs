//! Bounded retries with exponential backoff, jitter and cancellation.
//!
//! # Design
//! The retry loop is an explicit state machine: `Backoff` knows how many
//! attempts were made and which delay comes next, nothing else. Sleeping is
//! delegated to a `Sleeper`, so the schedule can be recorded in tests and the
//! same policy can drive a blocking or a suspended wait.
//!
//! Policy: attempt, classify, and on a retryable failure wait
//! `base * multiplier^(n-1)` (±jitter) before attempt `n + 1`. 4xx answers
//! and non-retryable transport errors are returned after a single attempt.
//! Once `max_attempts` is spent the last failure comes back wrapped in
//! `TransportError::Exhausted` with the attempt count.
//!
//! A `CancelToken` is checked before every attempt, wakes a pending backoff
//! sleep, and discards a response that arrives after cancellation. Dropping
//! that response hands its connection back to the pool. A send that is
//! already on the wire is bounded by the request timeout.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{Classification, Transport};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    /// Ceiling for a single backoff delay, jitter included.
    pub max_delay: Duration,
    /// Relative jitter applied to each delay, `0.2` meaning ±20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            multiplier: 2,
            max_delay: Duration::from_secs(10),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Default schedule with `retries` additional attempts after the first.
    pub fn with_max_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::with_max_retries(0)
    }

    /// Delay before retry number `retry` (1-based), without jitter, capped
    /// at `max_delay`.
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Attempt counter and delay schedule for one logical request.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record the start of an attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    /// Delay to wait after a retryable failure, or `None` once the budget is
    /// spent.
    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let nominal = self.policy.nominal_delay(self.attempts);
        if self.policy.jitter <= 0.0 {
            return Some(nominal);
        }
        let spread = self.policy.jitter;
        let jittered = nominal.mul_f64(1.0 + rng.random_range(-spread..=spread));
        Some(jittered.min(self.policy.max_delay))
    }
}

/// Cooperative cancellation flag shared between a caller and a request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, signal) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for up to `timeout`, returning early (with `true`) on cancel.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, signal) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = signal
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Waits out a backoff delay.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration, cancel: &CancelToken);
}

/// Blocks the calling thread; wakes early when the token is cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration, cancel: &CancelToken) {
        cancel.wait(delay);
    }
}

/// A completed exchange and how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub response: HttpResponse,
    pub attempts: u32,
}

/// Wraps a `Transport` with the retry policy.
#[derive(Debug, Clone)]
pub struct RetryingTransport<T, S = ThreadSleeper> {
    transport: T,
    policy: RetryPolicy,
    sleeper: S,
}

impl<T: Transport> RetryingTransport<T, ThreadSleeper> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            sleeper: ThreadSleeper,
        }
    }
}

impl<T: Transport, S: Sleeper> RetryingTransport<T, S> {
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> RetryingTransport<T, S2> {
        RetryingTransport {
            transport: self.transport,
            policy: self.policy,
            sleeper,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `request` until it succeeds, fails fatally, is cancelled or runs
    /// out of attempts.
    pub fn execute(
        &self,
        request: &HttpRequest,
        cancel: &CancelToken,
    ) -> Result<Exchange, TransportError> {
        let url = request.path.as_str();
        let method = request.method.as_str();
        let mut backoff = Backoff::new(self.policy);
        let mut rng = rand::rng();

        loop {
            if cancel.is_cancelled() {
                info!(method, url, attempts = backoff.attempts(), "request cancelled");
                return Err(TransportError::Cancelled {
                    url: url.to_string(),
                });
            }

            let attempt = backoff.begin_attempt();
            let outcome = self.transport.send(request);

            if cancel.is_cancelled() {
                drop(outcome);
                info!(method, url, attempt, "request cancelled, response discarded");
                return Err(TransportError::Cancelled {
                    url: url.to_string(),
                });
            }

            let failure = match outcome {
                Ok(response) => match Classification::of_status(response.status) {
                    Classification::Success => {
                        debug!(method, url, attempt, status = response.status, "attempt succeeded");
                        return Ok(Exchange {
                            response,
                            attempts: attempt,
                        });
                    }
                    Classification::Fatal => {
                        info!(method, url, attempt, status = response.status, "attempt rejected by service");
                        return Ok(Exchange {
                            response,
                            attempts: attempt,
                        });
                    }
                    Classification::Retryable => TransportError::Server {
                        url: url.to_string(),
                        status: response.status,
                        body: response.body_text(),
                    },
                },
                Err(e) if e.is_retryable() => e,
                Err(e) => {
                    warn!(method, url, attempt, error = %e, "attempt failed, not retryable");
                    return Err(e);
                }
            };

            match backoff.next_delay(&mut rng) {
                Some(delay) => {
                    warn!(
                        method,
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "attempt failed, retrying"
                    );
                    self.sleeper.sleep(delay, cancel);
                }
                None => {
                    error!(method, url, attempt, error = %failure, "attempt failed, retries exhausted");
                    return Err(TransportError::Exhausted {
                        attempts: attempt,
                        last: Box::new(failure),
                    });
                }
            }
        }
    }
}
