//! Request-pacing rate limiter.
//!
//! Admits on average one request per `wait_between_requests`, allowing short
//! bursts. Each admission inside the current window grows a request stack,
//! and the window to wait out grows with it (`wait_between_requests * stack`).
//! Once that window has elapsed the stack resets to one.
//!
//! Two admission modes share the state:
//! - [`RateLimiter::check_request`] fails fast once the stack reaches
//!   `max_request_stack`, returning the remaining backoff.
//! - [`RateLimiter::stack_up_request`] never fails. It keeps stacking past
//!   the soft cap and only sleeps out the backoff once the stack reaches the
//!   hard cap of `2 * max_request_stack`.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::LimiterConfig;
use crate::error::RateLimitError;

#[derive(Debug, Default)]
struct LimiterState {
    /// Start of the current window. Not moved when the stack grows.
    last_request: Option<Instant>,
    request_stack: u32,
}

/// Point-in-time view of a limiter, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimiterSnapshot {
    pub api_name: String,
    pub request_stack: u32,
    pub max_request_stack: u32,
}

/// Rate limiter guarding a single named upstream.
///
/// Share it between callers with an `Arc`; every read and write of the
/// pacing state happens under one lock per limiter.
#[derive(Debug)]
pub struct RateLimiter {
    api_name: String,
    wait_between_requests: Duration,
    max_request_stack: u32,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// A `max_request_stack` of zero is treated as one.
    pub fn new(
        api_name: impl Into<String>,
        wait_between_requests: Duration,
        max_request_stack: u32,
    ) -> Self {
        Self {
            api_name: api_name.into(),
            wait_between_requests,
            max_request_stack: max_request_stack.max(1),
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn from_config(api_name: impl Into<String>, config: &LimiterConfig) -> Self {
        Self::new(
            api_name,
            config.wait_between_requests,
            config.max_request_stack,
        )
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    /// Stack size at which [`RateLimiter::stack_up_request`] starts sleeping.
    pub fn hard_request_stack(&self) -> u32 {
        self.max_request_stack.saturating_mul(2)
    }

    /// Admits the request or fails with the remaining backoff.
    ///
    /// Call before every request to the upstream.
    pub async fn check_request(&self) -> Result<(), RateLimitError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        match self.remaining_wait(&state, now) {
            Some(backoff) => {
                if state.request_stack >= self.max_request_stack {
                    debug!(
                        api = %self.api_name,
                        backoff_ms = backoff.as_millis() as u64,
                        "Rate limit exceeded"
                    );
                    return Err(RateLimitError {
                        api_name: self.api_name.clone(),
                        backoff,
                    });
                }
                state.request_stack += 1;
            }
            None => Self::reset(&mut state, now),
        }

        Ok(())
    }

    /// Admits the request, sleeping if the hard cap has been reached.
    ///
    /// For callers that cannot branch on a rate-limit failure. The sleep
    /// happens while holding this limiter's lock, so concurrent callers of the
    /// same limiter queue up behind it.
    pub async fn stack_up_request(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        match self.remaining_wait(&state, now) {
            Some(backoff) if state.request_stack >= self.hard_request_stack() => {
                warn!(
                    api = %self.api_name,
                    request_stack = state.request_stack,
                    backoff_ms = backoff.as_millis() as u64,
                    "Request stack at hard limit, waiting out backoff"
                );
                tokio::time::sleep(backoff).await;
                Self::reset(&mut state, Instant::now());
            }
            Some(_) => state.request_stack += 1,
            None => Self::reset(&mut state, now),
        }
    }

    pub async fn snapshot(&self) -> LimiterSnapshot {
        let state = self.state.lock().await;
        LimiterSnapshot {
            api_name: self.api_name.clone(),
            request_stack: state.request_stack,
            max_request_stack: self.max_request_stack,
        }
    }

    /// Time left in the current window, or `None` if it has elapsed.
    fn remaining_wait(&self, state: &LimiterState, now: Instant) -> Option<Duration> {
        let last = state.last_request?;
        let has_to_wait = self.wait_between_requests * state.request_stack;
        let elapsed = now.saturating_duration_since(last);

        (elapsed < has_to_wait).then(|| has_to_wait - elapsed)
    }

    fn reset(state: &mut LimiterState, now: Instant) {
        state.last_request = Some(now);
        state.request_stack = 1;
    }
}
