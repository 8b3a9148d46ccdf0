/// Sliding-window rate limiter for download actions.
///
/// Keeps an ordered list of action timestamps per user and counts only
/// those inside the trailing window. Pruning happens lazily at read time;
/// an idle user costs nothing in the background.
///
/// Admission is a single atomic step: `try_acquire` prunes, checks the
/// limit, and records the slot under one lock acquisition, so a burst of
/// concurrent attempts can never be admitted past the limit. A slot taken
/// for an attempt that ends without a delivery is handed back with
/// `release`.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

#[derive(Clone)]
pub struct RateLimiter {
    window: Duration,
    entries: Arc<Mutex<HashMap<u64, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Limiter with the fixed one-hour window.
    pub fn hourly() -> Self {
        Self::new(Duration::from_secs(3600))
    }

    /// Actions recorded for the user inside the trailing window.
    pub async fn count(&self, uid: u64) -> usize {
        self.count_at(uid, Instant::now()).await
    }

    /// Record an action for the user now.
    pub async fn record(&self, uid: u64) {
        self.record_at(uid, Instant::now()).await;
    }

    /// Whether the user is still under the limit. Advisory only; admission
    /// for an actual download goes through `try_acquire`.
    pub async fn allowed(&self, uid: u64, limit: usize) -> bool {
        self.count(uid).await < limit
    }

    /// Atomically admit the user and reserve a slot. Pruning, the limit
    /// check, and the recording happen under one lock acquisition, so
    /// concurrent attempts cannot all observe the pre-burst count.
    pub async fn try_acquire(&self, uid: u64, limit: usize) -> bool {
        self.try_acquire_at(uid, limit, Instant::now()).await
    }

    /// Hand back the most recent slot, for attempts that end without a
    /// delivery (extraction failure, oversize file).
    pub async fn release(&self, uid: u64) {
        let mut entries = self.entries.lock().await;
        if let Some(stamps) = entries.get_mut(&uid) {
            stamps.pop();
            if stamps.is_empty() {
                entries.remove(&uid);
            }
        }
    }

    pub(crate) async fn count_at(&self, uid: u64, now: Instant) -> usize {
        let mut entries = self.entries.lock().await;
        let Some(stamps) = entries.get_mut(&uid) else {
            return 0;
        };
        stamps.retain(|ts| now.duration_since(*ts) < self.window);
        let remaining = stamps.len();
        if remaining == 0 {
            // Fully expired user, drop the key entirely.
            entries.remove(&uid);
        }
        remaining
    }

    pub(crate) async fn record_at(&self, uid: u64, now: Instant) {
        let mut entries = self.entries.lock().await;
        let stamps = entries.entry(uid).or_default();
        stamps.push(now);
        debug!("Recorded action for {}: {} in window", uid, stamps.len());
    }

    pub(crate) async fn try_acquire_at(&self, uid: u64, limit: usize, now: Instant) -> bool {
        let mut entries = self.entries.lock().await;
        let stamps = entries.entry(uid).or_default();
        stamps.retain(|ts| now.duration_since(*ts) < self.window);
        if stamps.len() >= limit {
            if stamps.is_empty() {
                entries.remove(&uid);
            }
            debug!("Denied action for {}: {} in window", uid, limit);
            return false;
        }
        stamps.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_actions_within_window() {
        let limiter = RateLimiter::hourly();
        let now = Instant::now();
        for _ in 0..3 {
            limiter.record_at(1, now).await;
        }
        assert_eq!(limiter.count_at(1, now).await, 3);
    }

    #[tokio::test]
    async fn count_returns_to_zero_after_window() {
        let limiter = RateLimiter::new(Duration::from_secs(3600));
        let now = Instant::now();
        limiter.record_at(1, now).await;
        limiter.record_at(1, now).await;
        let later = now + Duration::from_secs(3601);
        assert_eq!(limiter.count_at(1, later).await, 0);
        // The fully expired user is evicted, not just emptied.
        assert_eq!(limiter.count_at(1, later).await, 0);
    }

    #[tokio::test]
    async fn partial_expiry_keeps_recent_actions() {
        let limiter = RateLimiter::new(Duration::from_secs(3600));
        let now = Instant::now();
        limiter.record_at(1, now).await;
        limiter.record_at(1, now + Duration::from_secs(3000)).await;
        let later = now + Duration::from_secs(3601);
        assert_eq!(limiter.count_at(1, later).await, 1);
    }

    #[tokio::test]
    async fn allowed_compares_against_limit() {
        let limiter = RateLimiter::hourly();
        assert!(limiter.allowed(1, 2).await);
        limiter.record(1).await;
        assert!(limiter.allowed(1, 2).await);
        limiter.record(1).await;
        assert!(!limiter.allowed(1, 2).await);
    }

    #[tokio::test]
    async fn acquire_admits_until_limit() {
        let limiter = RateLimiter::hourly();
        assert!(limiter.try_acquire(1, 2).await);
        assert!(limiter.try_acquire(1, 2).await);
        assert!(!limiter.try_acquire(1, 2).await);
        assert_eq!(limiter.count(1).await, 2);
    }

    #[tokio::test]
    async fn release_frees_a_slot() {
        let limiter = RateLimiter::hourly();
        assert!(limiter.try_acquire(1, 1).await);
        assert!(!limiter.try_acquire(1, 1).await);
        limiter.release(1).await;
        assert!(limiter.try_acquire(1, 1).await);
    }

    #[tokio::test]
    async fn release_without_slot_is_a_noop() {
        let limiter = RateLimiter::hourly();
        limiter.release(1).await;
        assert_eq!(limiter.count(1).await, 0);
    }

    #[tokio::test]
    async fn expired_slots_free_capacity_for_acquire() {
        let limiter = RateLimiter::new(Duration::from_secs(3600));
        let now = Instant::now();
        assert!(limiter.try_acquire_at(1, 1, now).await);
        assert!(!limiter.try_acquire_at(1, 1, now + Duration::from_secs(10)).await);
        assert!(limiter.try_acquire_at(1, 1, now + Duration::from_secs(3601)).await);
    }

    #[tokio::test]
    async fn concurrent_burst_cannot_exceed_limit() {
        // Many simultaneous button presses must not all slip past the gate
        // before any slot lands.
        let limiter = RateLimiter::hourly();
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let l = limiter.clone();
            tasks.push(tokio::spawn(async move { l.try_acquire(1, 5).await }));
        }
        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
        assert_eq!(limiter.count(1).await, 5);
    }

    #[tokio::test]
    async fn users_are_independent() {
        let limiter = RateLimiter::hourly();
        limiter.record(1).await;
        assert_eq!(limiter.count(1).await, 1);
        assert_eq!(limiter.count(2).await, 0);
    }
}
