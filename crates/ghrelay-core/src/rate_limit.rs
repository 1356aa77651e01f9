//! Token-bucket pacing for outbound channel calls.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    /// Tokens added per `interval`.
    pub tokens_per_interval: u32,
    pub interval: Duration,
    /// Bucket capacity (max tokens banked while idle).
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Telegram allows ~20 msgs/min into a group; one every 3s stays under it.
        Self {
            tokens_per_interval: 1,
            interval: Duration::from_secs(3),
            burst: 1,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, refill_per_sec: f64, max_tokens: f64) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(max_tokens);
        self.last_update = now;
    }
}

/// Token bucket shared by everything that talks to the channel.
///
/// `acquire` holds tokio's fair mutex across the wait, so concurrent callers
/// are served in request order.
#[derive(Debug)]
pub struct RateLimiter {
    max_tokens: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimitConfig) -> Self {
        let max_tokens = cfg.burst.max(1) as f64;
        let interval_secs = cfg.interval.as_secs_f64().max(1e-9);

        Self {
            max_tokens,
            refill_per_sec: cfg.tokens_per_interval.max(1) as f64 / interval_secs,
            bucket: Mutex::new(Bucket {
                tokens: max_tokens,
                last_update: Instant::now(),
            }),
        }
    }

    /// Wait until a token is available, then consume it.
    pub async fn acquire(&self) {
        let mut bucket = self.bucket.lock().await;
        let wait = self.reserve(&mut bucket, Instant::now());
        if wait.is_zero() {
            return;
        }

        sleep(wait).await;
        bucket.refill(Instant::now(), self.refill_per_sec, self.max_tokens);
        // We slept exactly long enough for one token; float drift must not
        // turn into a second wait.
        bucket.tokens = (bucket.tokens - 1.0).max(0.0);
    }

    /// Consume a token if one is available right now.
    #[cfg(test)]
    async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        self.reserve(&mut bucket, Instant::now()).is_zero()
    }

    /// Tokens currently banked (after refill).
    #[cfg(test)]
    async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now(), self.refill_per_sec, self.max_tokens);
        bucket.tokens
    }

    /// Take a token if available and return zero, otherwise return how long
    /// until the next token without consuming anything.
    fn reserve(&self, bucket: &mut Bucket, now: Instant) -> Duration {
        bucket.refill(now, self.refill_per_sec, self.max_tokens);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Duration::ZERO;
        }

        let secs = (1.0 - bucket.tokens) / self.refill_per_sec;
        Duration::from_secs_f64(secs.max(0.0)).max(Duration::from_millis(1))
    }
}
