//! Idempotency guard for webhook deliveries.
//!
//! The telephony provider retries recording callbacks, so the same
//! recording reference can arrive more than once. Exactly one delivery may
//! win `try_acquire`; the rest are no-ops until the marker's TTL lapses.
//!
//! Markers are kept on `tokio::time::Instant` so expiry is testable with
//! paused time instead of wall-clock sleeps.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Deduplicates repeated delivery of the same notification key.
pub struct IdempotencyGuard {
    ttl: Duration,
    markers: Mutex<HashMap<String, Instant>>,
}

impl IdempotencyGuard {
    /// `ttl` must exceed the provider's retry window but stay short enough
    /// not to leak memory across long uptimes.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            markers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` when the caller owns processing for `key`,
    /// `false` when a live marker already exists (duplicate to ignore).
    ///
    /// Insert-if-absent under a single lock, so concurrent attempts for
    /// the same key admit exactly one winner.
    pub fn try_acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut markers = self.markers.lock();
        match markers.get(key) {
            Some(expires_at) if *expires_at > now => false,
            _ => {
                markers.insert(key.to_string(), now + self.ttl);
                true
            }
        }
    }

    /// Drop expired markers. Called periodically; `try_acquire` also
    /// treats an expired marker as absent, so sweeping is purely about
    /// bounding memory.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut markers = self.markers.lock();
        let before = markers.len();
        markers.retain(|_, expires_at| *expires_at > now);
        before - markers.len()
    }

    pub fn len(&self) -> usize {
        self.markers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.lock().is_empty()
    }
}
