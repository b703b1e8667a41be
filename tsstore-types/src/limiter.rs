//! Bounded-concurrency and byte-rate primitives (spec §2/§5).
//!
//! Two shared resources recur throughout the Store: a fixed-width concurrency
//! bound (open limiter, compaction limiter, the width-1 delete limiter) and an
//! optional byte-rate limiter with burst (compaction throughput). Both are
//! small enough, and specific enough to this crate's needs, to hand-write
//! rather than pull in a general-purpose rate-limiting crate — exactly the
//! kind of bespoke component spec.md §2 calls out as its own line item rather
//! than folding into "ambient stack".

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};

/// A fixed-width concurrency limiter. Acquiring a permit blocks (asynchronously)
/// until fewer than `width` permits are outstanding.
#[derive(Clone)]
pub struct Limiter {
    semaphore: Arc<Semaphore>,
}

impl Limiter {
    pub fn new(width: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(width.max(1))),
        }
    }

    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.semaphore
            .acquire()
            .await
            .expect("limiter semaphore is never closed")
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Default compaction-limiter width per spec §5: `min(max(1, cpus/2), cpus)`.
pub fn default_compaction_limiter_width(cpus: usize) -> usize {
    (cpus / 2).max(1).min(cpus.max(1))
}

/// A token-bucket byte-rate limiter with burst. `None`/unset means unlimited,
/// matching spec §5 ("unlimited when unset").
pub struct RateLimiter {
    inner: Option<parking_lot::Mutex<RateLimiterState>>,
}

struct RateLimiterState {
    bytes_per_sec: f64,
    burst: f64,
    available: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn unlimited() -> Self {
        Self { inner: None }
    }

    pub fn new(bytes_per_sec: u64, burst: u64) -> Self {
        Self {
            inner: Some(parking_lot::Mutex::new(RateLimiterState {
                bytes_per_sec: bytes_per_sec as f64,
                burst: burst as f64,
                available: burst as f64,
                last_refill: Instant::now(),
            })),
        }
    }

    /// Blocks (async) until `bytes` worth of budget is available, then spends it.
    pub async fn acquire(&self, bytes: u64) {
        let Some(state) = &self.inner else {
            return;
        };
        loop {
            let wait = {
                let mut state = state.lock();
                state.refill();
                if state.available >= bytes as f64 {
                    state.available -= bytes as f64;
                    None
                } else {
                    let deficit = bytes as f64 - state.available;
                    Some(Duration::from_secs_f64(deficit / state.bytes_per_sec))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

impl RateLimiterState {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.available = (self.available + elapsed * self.bytes_per_sec).min(self.burst);
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_compaction_width_is_half_cpus_capped() {
        assert_eq!(default_compaction_limiter_width(8), 4);
        assert_eq!(default_compaction_limiter_width(1), 1);
        assert_eq!(default_compaction_limiter_width(0), 1);
    }

    #[tokio::test]
    async fn limiter_bounds_concurrency() {
        let limiter = Limiter::new(2);
        let _p1 = limiter.acquire().await;
        let _p2 = limiter.acquire().await;
        assert_eq!(limiter.available_permits(), 0);
    }

    #[tokio::test]
    async fn unlimited_rate_limiter_never_blocks() {
        let limiter = RateLimiter::unlimited();
        limiter.acquire(u64::MAX).await;
    }

    #[tokio::test]
    async fn rate_limiter_spends_burst_immediately() {
        let limiter = RateLimiter::new(1024, 4096);
        limiter.acquire(4096).await;
    }
}
