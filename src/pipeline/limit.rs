//! Token-bucket rate limiter for pipeline stages.
//!
//! Tokens accrue at `limit` per second up to `burst`; each acquisition
//! spends one. A limit of 0 blocks acquisitions entirely (until the limit is
//! raised or the context cancels) and `f64::INFINITY` disables limiting.

use std::sync::Mutex;

use tokio::sync::Notify;
use tokio::time::{Duration, Instant};

use crate::error::{PicastError, Result};
use crate::pipeline::PipelineContext;

struct LimiterState {
    limit: f64,
    burst: u32,
    tokens: f64,
    refilled_at: Instant,
}

impl LimiterState {
    fn refill(&mut self, now: Instant) {
        if self.limit.is_infinite() {
            self.tokens = self.burst as f64;
        } else if self.limit > 0.0 {
            let elapsed = now.duration_since(self.refilled_at).as_secs_f64();
            self.tokens = (self.tokens + elapsed * self.limit).min(self.burst as f64);
        }
        self.refilled_at = now;
    }
}

/// A token-bucket limiter whose limit and burst can be changed while
/// acquisitions are in flight.
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    changed: Notify,
}

impl RateLimiter {
    /// A limiter allowing `limit` acquisitions per second with bursts of up
    /// to `burst`. The bucket starts full.
    pub fn new(limit: f64, burst: u32) -> Self {
        RateLimiter {
            state: Mutex::new(LimiterState {
                limit,
                burst,
                tokens: burst as f64,
                refilled_at: Instant::now(),
            }),
            changed: Notify::new(),
        }
    }

    /// Replaces the per-second limit; waiters re-evaluate immediately.
    pub fn set_limit(&self, limit: f64) {
        if let Ok(mut state) = self.state.lock() {
            let now = Instant::now();
            state.refill(now);
            state.limit = limit;
        }
        self.changed.notify_waiters();
    }

    /// Replaces the burst size; waiters re-evaluate immediately.
    pub fn set_burst(&self, burst: u32) {
        if let Ok(mut state) = self.state.lock() {
            let now = Instant::now();
            state.refill(now);
            state.burst = burst;
            state.tokens = state.tokens.min(burst as f64);
        }
        self.changed.notify_waiters();
    }

    /// Current per-second limit.
    pub fn limit(&self) -> f64 {
        self.state.lock().map(|s| s.limit).unwrap_or(0.0)
    }

    /// Blocks until a token is available or `ctx` cancels.
    pub async fn acquire(&self, ctx: &PipelineContext) -> Result<()> {
        loop {
            // Register for change notifications before inspecting state so
            // a concurrent set_limit cannot slip between the two.
            let notified = self.changed.notified();

            let wait = {
                let mut state = self
                    .state
                    .lock()
                    .map_err(|_| PicastError::Cancelled("rate limiter lock poisoned".into()))?;

                let now = Instant::now();
                state.refill(now);

                if state.limit.is_infinite() {
                    return Ok(());
                }
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
                if state.limit > 0.0 {
                    Some(Duration::from_secs_f64((1.0 - state.tokens) / state.limit))
                } else {
                    None // fully blocked until the limit changes
                }
            };

            match wait {
                Some(delay) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = notified => {}
                        cause = ctx.wait_cancelled() => {
                            return Err(PicastError::Cancelled(cause.to_string()));
                        }
                    }
                }
                None => {
                    tokio::select! {
                        _ = notified => {}
                        cause = ctx.wait_cancelled() => {
                            return Err(PicastError::Cancelled(cause.to_string()));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::cancel_context;

    #[tokio::test(start_paused = true)]
    async fn burst_then_refill_pacing() {
        let limiter = RateLimiter::new(10.0, 3);
        let ctx = PipelineContext::background();

        // The full burst is available immediately.
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(&ctx).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        // The next token takes ~1/10s of (auto-advanced) time.
        limiter.acquire(&ctx).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn infinite_limit_never_waits() {
        let limiter = RateLimiter::new(f64::INFINITY, 1);
        let ctx = PipelineContext::background();
        for _ in 0..10_000 {
            limiter.acquire(&ctx).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_limit_blocks_until_raised() {
        let limiter = std::sync::Arc::new(RateLimiter::new(0.0, 1));
        let ctx = PipelineContext::background();

        let waiter = {
            let limiter = limiter.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { limiter.acquire(&ctx).await })
        };

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!waiter.is_finished(), "acquire must block at limit 0");

        limiter.set_limit(f64::INFINITY);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_acquire() {
        let limiter = RateLimiter::new(0.0, 1);
        let (cancel, ctx) = cancel_context();

        let acquire = limiter.acquire(&ctx);
        tokio::pin!(acquire);

        tokio::select! {
            _ = &mut acquire => panic!("must not acquire at limit 0"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }

        cancel.cancel(PicastError::Cancelled("stop".into()));
        let err = acquire.await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test(start_paused = true)]
    async fn set_burst_caps_accumulated_tokens() {
        let limiter = RateLimiter::new(1000.0, 100);
        let ctx = PipelineContext::background();

        limiter.set_burst(1);
        limiter.acquire(&ctx).await.unwrap();

        // Only one token was left after the cap.
        let start = Instant::now();
        limiter.acquire(&ctx).await.unwrap();
        assert!(start.elapsed() >= Duration::from_micros(900));
    }
}
