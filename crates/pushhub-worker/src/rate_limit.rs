//! Token bucket limiting how many jobs the worker starts per second.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Process-wide token bucket. Burst equals the per-second rate.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<TokenBucket>>,
    max_tokens: f64,
    refill_rate: f64,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Allow `per_second` acquisitions per second. Zero disables limiting.
    pub fn new(per_second: u32) -> Self {
        let max_tokens = f64::from(per_second);
        Self {
            bucket: Arc::new(Mutex::new(TokenBucket {
                tokens: max_tokens,
                last_refill: Instant::now(),
            })),
            max_tokens,
            refill_rate: max_tokens,
        }
    }

    fn refill(&self, bucket: &mut TokenBucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        bucket.last_refill = now;
    }

    /// Take a token if one is available.
    pub async fn try_acquire(&self) -> bool {
        if self.refill_rate <= 0.0 {
            return true;
        }
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait for a token.
    pub async fn acquire(&self) {
        if self.refill_rate <= 0.0 {
            return;
        }
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                (1.0 - bucket.tokens) / self.refill_rate
            };
            tokio::time::sleep(Duration::from_secs_f64(wait)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            assert!(limiter.try_acquire().await);
        }
        assert!(!limiter.try_acquire().await);

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_paces_to_rate() {
        let limiter = RateLimiter::new(100);
        let start = Instant::now();
        for _ in 0..150 {
            limiter.acquire().await;
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(490), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(700), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_zero_rate_is_unlimited() {
        let limiter = RateLimiter::new(0);
        for _ in 0..1000 {
            assert!(limiter.try_acquire().await);
        }
    }
}
