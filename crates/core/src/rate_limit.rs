use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Process-wide admission check run before the business handler.
///
/// Concurrent `admit` calls must be linearizable: each one atomically takes
/// a slot or is denied.
pub trait AdmissionGate: Send + Sync {
    fn admit(&self) -> bool;
}

const WINDOW: Duration = Duration::from_secs(1);

/// Sliding one-second window limiter shared by every in-flight request.
pub struct RateLimiter {
    max_per_second: u32,
    window: Mutex<SlidingWindow>,
}

struct SlidingWindow {
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
        }
    }

    /// Remove timestamps older than the window and return current count.
    fn count_and_prune(&mut self, now: Instant) -> usize {
        while let Some(&oldest) = self.timestamps.front() {
            if now.duration_since(oldest) < WINDOW {
                break;
            }
            self.timestamps.pop_front();
        }
        self.timestamps.len()
    }
}

impl RateLimiter {
    pub fn new(max_per_second: u32) -> Self {
        Self {
            max_per_second,
            window: Mutex::new(SlidingWindow::new()),
        }
    }

    /// Returns `None` when the configuration leaves the gate disabled.
    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_requests_per_second))
    }

    pub fn limit(&self) -> u32 {
        self.max_per_second
    }

    fn admit_at(&self, now: Instant) -> bool {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        if window.count_and_prune(now) >= self.max_per_second as usize {
            return false;
        }
        window.timestamps.push_back(now);
        true
    }
}

impl AdmissionGate for RateLimiter {
    fn admit(&self) -> bool {
        self.admit_at(Instant::now())
    }
}
