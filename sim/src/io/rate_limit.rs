//! Requests-per-minute, burst and daily quota limiting for LLM calls.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::io::llm::{ChatRequest, LlmClient, LlmError};

pub const WINDOW: Duration = Duration::from_secs(60);
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Sliding-window limiter. Time is passed in so the arithmetic is testable.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Calls allowed in any window: the smaller of rpm and burst.
    per_window: usize,
    daily_limit: Option<u32>,
    events: VecDeque<Instant>,
    daily_count: u32,
    day_start: Instant,
}

impl RateLimiter {
    pub fn new(rpm: u32, burst: u32, daily_limit: Option<u32>, now: Instant) -> Self {
        Self {
            per_window: rpm.min(burst).max(1) as usize,
            daily_limit,
            events: VecDeque::new(),
            daily_count: 0,
            day_start: now,
        }
    }

    /// Claim a slot for a call at `now` and return how long to wait first.
    ///
    /// The call is recorded at `now + delay`.
    pub fn reserve(&mut self, now: Instant) -> Duration {
        if now.saturating_duration_since(self.day_start) >= DAY {
            self.daily_count = 0;
            self.day_start = now;
        }

        let mut delay = Duration::ZERO;
        if let Some(limit) = self.daily_limit
            && self.daily_count >= limit
        {
            delay = DAY.saturating_sub(now.saturating_duration_since(self.day_start));
            self.daily_count = 0;
            self.day_start = now + delay;
        }

        let at = now + delay;
        while self
            .events
            .front()
            .is_some_and(|first| at.saturating_duration_since(*first) >= WINDOW)
        {
            self.events.pop_front();
        }
        if self.events.len() >= self.per_window
            && let Some(first) = self.events.front()
        {
            delay += WINDOW.saturating_sub(at.saturating_duration_since(*first));
        }

        self.events.push_back(now + delay);
        if self.events.len() > self.per_window {
            self.events.pop_front();
        }
        self.daily_count += 1;
        delay
    }
}

/// [`LlmClient`] decorator that sleeps before calls to respect the limiter.
pub struct RateLimited<C> {
    inner: C,
    limiter: RefCell<RateLimiter>,
    sleep: Box<dyn Fn(Duration)>,
}

impl<C: LlmClient> RateLimited<C> {
    pub fn new(inner: C, limiter: RateLimiter) -> Self {
        Self::with_sleep(inner, limiter, Box::new(thread::sleep))
    }

    pub fn with_sleep(inner: C, limiter: RateLimiter, sleep: Box<dyn Fn(Duration)>) -> Self {
        Self {
            inner,
            limiter: RefCell::new(limiter),
            sleep,
        }
    }
}

impl<C: LlmClient> LlmClient for RateLimited<C> {
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let delay = self.limiter.borrow_mut().reserve(Instant::now());
        if !delay.is_zero() {
            info!(wait_secs = delay.as_secs_f64(), "rate limit reached, waiting");
            (self.sleep)(delay);
        }
        self.inner.complete(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::llm::{OfflineLlm, Voice};
    use std::rc::Rc;

    #[test]
    fn rpm_window_delays_extra_calls() {
        let t0 = Instant::now();
        let mut limiter = RateLimiter::new(2, 10, None, t0);
        assert_eq!(limiter.reserve(t0), Duration::ZERO);
        assert_eq!(limiter.reserve(t0), Duration::ZERO);
        assert_eq!(limiter.reserve(t0 + Duration::from_secs(1)), Duration::from_secs(59));
        // Window slid past the first two calls.
        assert_eq!(limiter.reserve(t0 + Duration::from_secs(61)), Duration::ZERO);
    }

    #[test]
    fn burst_caps_below_rpm() {
        let t0 = Instant::now();
        let mut limiter = RateLimiter::new(30, 3, None, t0);
        for _ in 0..3 {
            assert_eq!(limiter.reserve(t0), Duration::ZERO);
        }
        assert_eq!(limiter.reserve(t0), WINDOW);
    }

    #[test]
    fn daily_limit_waits_for_reset() {
        let t0 = Instant::now();
        let mut limiter = RateLimiter::new(100, 100, Some(2), t0);
        limiter.reserve(t0);
        limiter.reserve(t0);
        let later = t0 + Duration::from_secs(3600);
        assert_eq!(limiter.reserve(later), DAY - Duration::from_secs(3600));
        assert_eq!(limiter.daily_count, 1);
    }

    #[test]
    fn decorator_sleeps_then_delegates() {
        let slept = Rc::new(RefCell::new(Vec::new()));
        let record = Rc::clone(&slept);
        let limited = RateLimited::with_sleep(
            OfflineLlm::new(),
            RateLimiter::new(1, 1, None, Instant::now()),
            Box::new(move |d| record.borrow_mut().push(d)),
        );
        let request = ChatRequest {
            voice: Voice::Member,
            system: String::new(),
            developer: String::new(),
            user: "hi".to_string(),
            max_tokens: 10,
        };
        limited.complete(&request).expect("first");
        limited.complete(&request).expect("second");

        let slept = slept.borrow();
        assert_eq!(slept.len(), 1);
        assert!(slept[0] > Duration::from_secs(55));
    }
}
