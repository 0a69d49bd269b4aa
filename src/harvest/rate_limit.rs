//! Rate limiters and clocks.
//!
//! Two pacing strategies are provided:
//! - [`FixedInterval`]: a fixed pause on every call (5s between search pages,
//!   150s between clones by default)
//! - [`TokenBucket`]: sized from a provider quota such as "30 requests per
//!   minute"; waits only when the bucket runs dry
//!
//! Both read time through an injected [`Clock`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::harvest::traits::{Clock, RateLimiter};

// ============================================================================
// Clocks
// ============================================================================

/// Wall clock backed by `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock that records every sleep and advances instantly.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Moves virtual time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        *elapsed += by;
    }

    /// All sleeps requested so far, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        self.advance(duration);
    }
}

// ============================================================================
// Rate Limiters
// ============================================================================

/// Pauses for the same duration on every call.
pub struct FixedInterval {
    delay: Duration,
    clock: Arc<dyn Clock>,
}

impl FixedInterval {
    pub fn new(delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { delay, clock }
    }
}

#[async_trait]
impl RateLimiter for FixedInterval {
    async fn throttle(&self) {
        debug!(delay_secs = self.delay.as_secs_f64(), "Pausing");
        self.clock.sleep(self.delay).await;
    }

    fn describe(&self) -> String {
        format!("fixed {}s", self.delay.as_secs_f64())
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket holding up to `capacity` tokens, refilled continuously at
/// `capacity` tokens per `window`.
pub struct TokenBucket {
    capacity: f64,
    per_token: Duration,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    /// Builds a bucket from a provider quota: `quota` operations per `window`.
    ///
    /// The bucket starts full. A zero quota is treated as one.
    pub fn from_quota(quota: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        let quota = quota.max(1);
        let now = clock.now();
        Self {
            capacity: f64::from(quota),
            per_token: window / quota,
            state: Mutex::new(BucketState {
                tokens: f64::from(quota),
                last_refill: now,
            }),
            clock,
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        if !self.per_token.is_zero() {
            let gained = elapsed.as_secs_f64() / self.per_token.as_secs_f64();
            state.tokens = (state.tokens + gained).min(self.capacity);
        } else {
            state.tokens = self.capacity;
        }
        state.last_refill = now;
    }

    /// Takes a token if one is available, otherwise returns the wait needed.
    fn try_take(&self) -> Option<Duration> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            Some(self.per_token.mul_f64(1.0 - state.tokens))
        }
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn throttle(&self) {
        if let Some(wait) = self.try_take() {
            debug!(wait_secs = wait.as_secs_f64(), "Token bucket empty, waiting");
            self.clock.sleep(wait).await;

            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            self.refill(&mut state);
            state.tokens = (state.tokens - 1.0).max(0.0);
        }
    }

    fn describe(&self) -> String {
        format!(
            "token bucket {} per {}s",
            self.capacity,
            self.per_token.as_secs_f64() * self.capacity
        )
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Serializable choice of pacing strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateLimitPolicy {
    Fixed { delay_secs: f64 },
    TokenBucket { quota: u32, window_secs: f64 },
}

impl RateLimitPolicy {
    pub fn fixed_secs(delay_secs: f64) -> Self {
        RateLimitPolicy::Fixed { delay_secs }
    }

    pub fn build(&self, clock: Arc<dyn Clock>) -> Arc<dyn RateLimiter> {
        match self {
            RateLimitPolicy::Fixed { delay_secs } => {
                Arc::new(FixedInterval::new(secs(*delay_secs), clock))
            }
            RateLimitPolicy::TokenBucket { quota, window_secs } => {
                Arc::new(TokenBucket::from_quota(*quota, secs(*window_secs), clock))
            }
        }
    }
}

// Negative or non-finite values become zero
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

// ============================================================================
// Tests
// ============================================================================
