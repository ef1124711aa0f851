// src/rate_limit.rs
// The free Alpha Vantage tier allows roughly five calls per minute. The client
// asks its gate before every request; which gate is used is configuration.
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[async_trait]
pub trait RateGate: Send + Sync {
    /// Waits until one more outbound call is allowed.
    async fn acquire(&self);
}

/// Sleeps a fixed interval before every call, regardless of history.
/// Concurrent callers queue on the gate, so releases are at least one
/// interval apart.
pub struct FixedDelay {
    interval: Duration,
    turn: tokio::sync::Mutex<()>,
}

impl FixedDelay {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            turn: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl RateGate for FixedDelay {
    async fn acquire(&self) {
        let _turn = self.turn.lock().await;
        if self.interval > Duration::ZERO {
            debug!("Rate gate: sleeping {:?} before provider call", self.interval);
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

/// Token bucket allowing short bursts up to `capacity`.
pub struct TokenBucket {
    state: Mutex<Bucket>,
    rate_per_sec: f64,
    capacity: f64,
}

impl TokenBucket {
    pub fn new(requests_per_minute: u32, capacity: f64) -> Self {
        let capacity = capacity.max(1.0);
        Self {
            state: Mutex::new(Bucket {
                tokens: capacity,
                last_update: Instant::now(),
            }),
            rate_per_sec: f64::from(requests_per_minute.max(1)) / 60.0,
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Token bucket mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Takes a token if one is available, otherwise returns the wait time.
    fn try_take(&self) -> Result<(), Duration> {
        let mut bucket = self.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_update).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - bucket.tokens;
            Err(Duration::from_secs_f64(missing / self.rate_per_sec))
        }
    }
}

#[async_trait]
impl RateGate for TokenBucket {
    async fn acquire(&self) {
        loop {
            match self.try_take() {
                Ok(()) => return,
                Err(wait) => {
                    debug!("Rate gate: bucket empty, waiting {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_allows_burst_then_blocks() {
        let bucket = TokenBucket::new(5, 2.0);
        assert!(bucket.try_take().is_ok());
        assert!(bucket.try_take().is_ok());
        let wait = bucket.try_take().unwrap_err();
        assert!(wait > Duration::from_secs(10));
        assert!(wait <= Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_delay_waits_every_call() {
        let gate = FixedDelay::new(Duration::from_secs(12));
        let start = tokio::time::Instant::now();
        gate.acquire().await;
        gate.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(24));
    }

    async fn released_after(gate: &FixedDelay, start: tokio::time::Instant) -> Duration {
        gate.acquire().await;
        start.elapsed()
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_delay_spaces_concurrent_callers() {
        let gate = FixedDelay::new(Duration::from_secs(12));
        let start = tokio::time::Instant::now();
        let (a, b) = tokio::join!(
            released_after(&gate, start),
            released_after(&gate, start)
        );
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        assert!(first >= Duration::from_secs(12));
        assert!(second - first >= Duration::from_secs(12));
    }

    #[tokio::test]
    async fn token_bucket_refills() {
        let gate = TokenBucket::new(600, 1.0);
        let start = Instant::now();
        gate.acquire().await;
        gate.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(90));
    }
}
