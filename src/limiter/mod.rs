//! Adaptive per-domain rate limiter
//!
//! Each domain gets its own delay controller. The delay grows when the
//! server is slow or erroring and decays when responses come back fast,
//! always staying within [min_delay, MAX_DELAY]. Same-domain requests are
//! serialized by the domain's own lock; different domains never wait on
//! each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Upper bound on any per-domain delay
pub const MAX_DELAY: Duration = Duration::from_secs(60);
/// Multiplier applied after a run of consecutive errors
pub const ERROR_PENALTY: f64 = 2.0;
/// Multiplier when the server responds slower than the current delay
pub const GROWTH_FACTOR: f64 = 1.5;
/// Multiplier when the server responds in under half the current delay
pub const DECAY_FACTOR: f64 = 0.8;
/// Errors in a row before the penalty fires
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Delay controller state for one domain
#[derive(Debug, Clone)]
pub struct DomainRateState {
    min_delay: Duration,
    current_delay: Duration,
    last_request: Option<Instant>,
    consecutive_errors: u32,
}

impl DomainRateState {
    pub fn new(min_delay: Duration) -> Self {
        let min_delay = min_delay.min(MAX_DELAY);
        Self {
            min_delay,
            current_delay: min_delay,
            last_request: None,
            consecutive_errors: 0,
        }
    }

    /// Time still to wait before the next request may go out
    pub fn delay_until(&self, now: Instant) -> Duration {
        match self.last_request {
            Some(last) => {
                let ready = last + self.current_delay;
                ready.saturating_duration_since(now)
            }
            None => Duration::ZERO,
        }
    }

    /// Stamps the moment a request was released
    pub fn record_request(&mut self, now: Instant) {
        self.last_request = Some(now);
    }

    /// Adjusts the delay from an observed response
    ///
    /// Statuses >= 400 count toward the error run; once the run reaches
    /// [`MAX_CONSECUTIVE_ERRORS`] the delay doubles and the counter resets.
    /// Successful responses reset the counter and grow or decay the delay
    /// based on how the response time compares to the current delay.
    pub fn apply_response(&mut self, response_time: Duration, status: u16) {
        if status >= 400 {
            self.consecutive_errors += 1;
            if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                self.current_delay = self.current_delay.mul_f64(ERROR_PENALTY).min(MAX_DELAY);
                self.consecutive_errors = 0;
            }
            return;
        }

        self.consecutive_errors = 0;
        if response_time > self.current_delay {
            self.current_delay = self.current_delay.mul_f64(GROWTH_FACTOR).min(MAX_DELAY);
        } else if response_time < self.current_delay / 2 {
            self.current_delay = self.current_delay.mul_f64(DECAY_FACTOR).max(self.min_delay);
        }
    }

    /// Raises the delay floor to a robots-declared crawl delay
    pub fn apply_crawl_delay(&mut self, delay: Duration) {
        self.min_delay = self.min_delay.max(delay).min(MAX_DELAY);
        if self.current_delay < self.min_delay {
            self.current_delay = self.min_delay;
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn last_request(&self) -> Option<Instant> {
        self.last_request
    }
}

/// Rate limiter over all domains seen so far
///
/// The outer map lock is held only to look up or create a domain entry;
/// the courtesy sleep happens under the domain's own lock.
pub struct RateLimiter {
    domains: Mutex<HashMap<String, Arc<Mutex<DomainRateState>>>>,
    /// Starting (and lowest possible) delay for new domains
    floor: Duration,
}

impl RateLimiter {
    pub fn new(floor: Duration) -> Self {
        Self {
            domains: Mutex::new(HashMap::new()),
            floor,
        }
    }

    fn entry(&self, domain: &str) -> Arc<Mutex<DomainRateState>> {
        let mut domains = self.domains.lock().unwrap();
        Arc::clone(
            domains
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(DomainRateState::new(self.floor)))),
        )
    }

    /// Blocks until the domain's courtesy delay has elapsed, then stamps
    /// the request time
    ///
    /// The sleep holds the domain lock, so concurrent workers targeting
    /// the same domain leave one delay apart.
    pub fn wait(&self, domain: &str) {
        let entry = self.entry(domain);
        let mut state = entry.lock().unwrap();
        let remaining = state.delay_until(Instant::now());
        if !remaining.is_zero() {
            trace!(domain, wait_ms = remaining.as_millis() as u64, "rate limit wait");
            std::thread::sleep(remaining);
        }
        state.record_request(Instant::now());
    }

    /// Feeds an observed response into the domain's controller
    pub fn update(&self, domain: &str, response_time: Duration, status: u16) {
        let entry = self.entry(domain);
        let mut state = entry.lock().unwrap();
        let before = state.current_delay();
        state.apply_response(response_time, status);
        let after = state.current_delay();
        if before != after {
            debug!(
                domain,
                status,
                before_ms = before.as_millis() as u64,
                after_ms = after.as_millis() as u64,
                "adjusted domain delay"
            );
        }
    }

    /// Applies a robots.txt crawl-delay to the domain
    pub fn set_crawl_delay(&self, domain: &str, delay_secs: f64) {
        if !delay_secs.is_finite() || delay_secs <= 0.0 {
            return;
        }
        let delay = Duration::from_secs_f64(delay_secs.min(MAX_DELAY.as_secs_f64()));
        let entry = self.entry(domain);
        let mut state = entry.lock().unwrap();
        state.apply_crawl_delay(delay);
        debug!(domain, delay_secs, "applied robots crawl delay");
    }

    /// Copy of a domain's state, if the domain has been seen
    pub fn snapshot(&self, domain: &str) -> Option<DomainRateState> {
        let domains = self.domains.lock().unwrap();
        domains.get(domain).map(|e| e.lock().unwrap().clone())
    }
}
