//! Client-side upload rate limiting
//!
//! A sliding window log: the timestamps of accepted uploads are kept in
//! order, and anything older than the window is purged before each query.
//!
//! The limiter is advisory. [`RateLimiter::can_upload`] and
//! [`RateLimiter::record_upload`] are separate calls, and a caller that
//! records without asking first will overshoot the limit. The real limit
//! belongs to the server.
//!
//! # Example
//!
//! ```rust
//! use presign_uploadr::ratelimit::RateLimiter;
//! use std::time::Duration;
//!
//! let mut limiter = RateLimiter::new(2, Duration::from_secs(60));
//!
//! assert!(limiter.can_upload());
//! limiter.record_upload();
//! limiter.record_upload();
//! assert!(!limiter.can_upload());
//! assert_eq!(limiter.remaining_uploads(), 0);
//! ```

use crate::config::RateLimitConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding window upload counter.
///
/// Not synchronized. Use [`SharedRateLimiter`] when several submission
/// paths share one window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_uploads: u32,
    window: Duration,
    uploads: VecDeque<Instant>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_uploads` per `window`.
    ///
    /// # Panics
    ///
    /// Panics if `max_uploads` is 0 or `window` is zero.
    pub fn new(max_uploads: u32, window: Duration) -> Self {
        assert!(max_uploads > 0, "Max uploads must be greater than 0");
        assert!(!window.is_zero(), "Window must be non-zero");

        Self {
            max_uploads,
            window,
            uploads: VecDeque::with_capacity(max_uploads as usize),
        }
    }

    /// Create a limiter with a window given in (possibly fractional) minutes
    ///
    /// # Panics
    ///
    /// Panics if `max_uploads` is 0, or if `window_minutes` is negative,
    /// not finite, overflows a `Duration` or rounds to a zero window. Use
    /// [`RateLimiter::from_config`] for values read from configuration.
    pub fn per_minutes(max_uploads: u32, window_minutes: f64) -> Self {
        Self::new(max_uploads, Duration::from_secs_f64(window_minutes * 60.0))
    }

    /// Create a limiter from configuration. Out-of-range windows fall back
    /// to the default window instead of panicking.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_uploads, config.window())
    }

    pub fn max_uploads(&self) -> u32 {
        self.max_uploads
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether another upload fits in the window right now
    pub fn can_upload(&mut self) -> bool {
        self.can_upload_at(Instant::now())
    }

    /// Whether another upload fits in the window at `now`
    pub fn can_upload_at(&mut self, now: Instant) -> bool {
        self.purge(now);
        self.uploads.len() < self.max_uploads as usize
    }

    /// Record an accepted upload now
    pub fn record_upload(&mut self) {
        self.record_upload_at(Instant::now());
    }

    /// Record an accepted upload at `at`
    pub fn record_upload_at(&mut self, at: Instant) {
        self.uploads.push_back(at);
    }

    /// Uploads still allowed in the current window
    pub fn remaining_uploads(&mut self) -> u32 {
        self.remaining_uploads_at(Instant::now())
    }

    pub fn remaining_uploads_at(&mut self, now: Instant) -> u32 {
        self.purge(now);
        self.max_uploads.saturating_sub(self.uploads.len() as u32)
    }

    /// Drop every timestamp at least one window old
    fn purge(&mut self, now: Instant) {
        while let Some(front) = self.uploads.front() {
            if now.saturating_duration_since(*front) >= self.window {
                self.uploads.pop_front();
            } else {
                break;
            }
        }
    }
}

/// A [`RateLimiter`] behind a mutex, for use from concurrent batches.
///
/// Every operation takes the lock, so updates to the window are never lost.
/// [`SharedRateLimiter::try_acquire`] combines the check and the record in
/// one critical section for callers that want a hard gate.
#[derive(Debug, Clone)]
pub struct SharedRateLimiter {
    inner: Arc<Mutex<RateLimiter>>,
}

impl SharedRateLimiter {
    pub fn new(limiter: RateLimiter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(limiter)),
        }
    }

    pub fn can_upload(&self) -> bool {
        self.inner.lock().can_upload()
    }

    pub fn record_upload(&self) {
        self.inner.lock().record_upload();
    }

    pub fn remaining_uploads(&self) -> u32 {
        self.inner.lock().remaining_uploads()
    }

    pub fn window(&self) -> Duration {
        self.inner.lock().window()
    }

    /// Check and record atomically. Returns whether the upload was admitted.
    pub fn try_acquire(&self) -> bool {
        let mut limiter = self.inner.lock();
        let now = Instant::now();
        if limiter.can_upload_at(now) {
            limiter.record_upload_at(now);
            true
        } else {
            false
        }
    }
}

impl From<RateLimiter> for SharedRateLimiter {
    fn from(limiter: RateLimiter) -> Self {
        Self::new(limiter)
    }
}
