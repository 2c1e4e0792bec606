//! Rate limiting module
//!
//! Per-provider sliding-window limiter. Every dispatch to a provider records
//! a timestamp; a provider is rate-limited while the number of timestamps in
//! the trailing 60 seconds has reached its requests-per-minute limit.
//!
//! Expired timestamps are pruned lazily whenever a window is inspected. Each
//! provider owns one window behind its own mutex, and [`RateLimiter::try_acquire`]
//! checks and records under that single lock so concurrent dispatches cannot
//! overshoot the limit.
//!
//! Time is read through the [`Clock`] trait so tests can move it forward
//! without sleeping.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Length of the sliding window
pub const WINDOW: Duration = Duration::from_secs(60);

/// Source of monotonic time
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock used in production
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + offset
    }
}

/// Timestamps of recent dispatches for one provider
#[derive(Debug)]
struct SlidingWindow {
    limit: u32,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    fn prune(timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = timestamps.front() {
            if now.saturating_duration_since(oldest) >= WINDOW {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn in_window(&self, now: Instant) -> usize {
        let mut timestamps = self.timestamps.lock().unwrap_or_else(|e| e.into_inner());
        Self::prune(&mut timestamps, now);
        timestamps.len()
    }

    fn try_acquire(&self, now: Instant) -> bool {
        let mut timestamps = self.timestamps.lock().unwrap_or_else(|e| e.into_inner());
        Self::prune(&mut timestamps, now);
        if timestamps.len() >= self.limit as usize {
            return false;
        }
        timestamps.push_back(now);
        true
    }
}

/// Snapshot of one provider's window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUsage {
    pub in_window: usize,
    pub limit: u32,
}

/// Rate limiter over every registered provider
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    windows: HashMap<String, SlidingWindow>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: HashMap::new(),
        }
    }

    /// Register a provider with its requests-per-minute limit
    pub fn register(&mut self, provider: &str, requests_per_minute: u32) {
        self.windows
            .insert(provider.to_string(), SlidingWindow::new(requests_per_minute));
    }

    /// Whether the provider has used up its window.
    ///
    /// Unknown providers are reported as limited.
    pub fn is_rate_limited(&self, provider: &str) -> bool {
        match self.windows.get(provider) {
            Some(window) => window.in_window(self.clock.now()) >= window.limit as usize,
            None => true,
        }
    }

    /// Check the window and record a dispatch atomically.
    ///
    /// Returns `false` (and records nothing) when the provider is limited.
    pub fn try_acquire(&self, provider: &str) -> bool {
        let Some(window) = self.windows.get(provider) else {
            return false;
        };
        let allowed = window.try_acquire(self.clock.now());
        if !allowed {
            debug!(
                "Rate limit reached for provider {} ({}/min)",
                provider, window.limit
            );
        }
        allowed
    }

    pub fn usage(&self, provider: &str) -> Option<WindowUsage> {
        self.windows.get(provider).map(|window| WindowUsage {
            in_window: window.in_window(self.clock.now()),
            limit: window.limit,
        })
    }
}
