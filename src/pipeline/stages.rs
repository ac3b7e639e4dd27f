//! Ready-made pipeline stages: throttling, pausing, and fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{PicastError, Result};
use crate::pipeline::limit::RateLimiter;
use crate::pipeline::{PipelineContext, Stage};

/// Throttles the flow of items to a per-second limit with a burst
/// allowance. The instantaneous throughput may fall below the limit, or
/// exceed it briefly when `burst > 1`.
pub struct ThrottleStage {
    limiter: Arc<RateLimiter>,
}

impl ThrottleStage {
    /// A throttle at `limit` items per second, bursting up to `burst`.
    pub fn new(limit: f64, burst: u32) -> Self {
        ThrottleStage {
            limiter: Arc::new(RateLimiter::new(limit, burst)),
        }
    }

    /// A handle for adjusting the throttle at runtime.
    pub fn handle(&self) -> ThrottleHandle {
        ThrottleHandle {
            limiter: self.limiter.clone(),
        }
    }
}

#[async_trait]
impl<T: Send> Stage<T> for ThrottleStage {
    async fn effect(&mut self, ctx: &PipelineContext, _item: &mut T) -> Result<()> {
        self.limiter.acquire(ctx).await
    }
}

/// Adjusts a [`ThrottleStage`] while the pipeline runs.
#[derive(Clone)]
pub struct ThrottleHandle {
    limiter: Arc<RateLimiter>,
}

impl ThrottleHandle {
    /// Replaces the per-second limit.
    pub fn set_limit(&self, limit: f64) {
        self.limiter.set_limit(limit);
    }

    /// Replaces the burst size.
    pub fn set_burst(&self, burst: u32) {
        self.limiter.set_burst(burst);
    }
}

/// A throttle toggled between fully blocked and unlimited.
///
/// The default state is paused.
pub struct PauserStage {
    inner: ThrottleStage,
}

impl PauserStage {
    /// A pauser, created paused.
    pub fn new() -> Self {
        PauserStage {
            inner: ThrottleStage::new(0.0, 1),
        }
    }

    /// A handle for toggling the pauser at runtime.
    pub fn handle(&self) -> PauserHandle {
        PauserHandle {
            throttle: self.inner.handle(),
        }
    }
}

impl Default for PauserStage {
    fn default() -> Self {
        PauserStage::new()
    }
}

#[async_trait]
impl<T: Send> Stage<T> for PauserStage {
    async fn effect(&mut self, ctx: &PipelineContext, item: &mut T) -> Result<()> {
        self.inner.effect(ctx, item).await
    }
}

/// Toggles a [`PauserStage`] while the pipeline runs.
#[derive(Clone)]
pub struct PauserHandle {
    throttle: ThrottleHandle,
}

impl PauserHandle {
    /// Pauses or resumes the stage.
    pub fn set_paused(&self, paused: bool) {
        if paused {
            self.throttle.set_limit(0.0);
        } else {
            self.throttle.set_limit(f64::INFINITY);
        }
    }
}

/// Duplicates each item onto a side channel before forwarding it, splitting
/// the pipeline into two paths. The side channel's receiver can feed the
/// head of another pipeline.
///
/// In blocking mode every item reaches the side channel, stalling the main
/// path when the side consumer lags. In non-blocking mode items are dropped
/// when the side channel is full, and the main path never stalls.
pub struct SplitStage<T> {
    side: Option<mpsc::Sender<T>>,
    blocking: bool,
}

/// Builds a split stage; the returned receiver is the side output, closed
/// when the stage is torn down by its pipeline.
pub fn split_stage<T: Send + Clone>(
    side_buffer: usize,
    blocking: bool,
) -> (SplitStage<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(side_buffer.max(1));
    (
        SplitStage {
            side: Some(tx),
            blocking,
        },
        rx,
    )
}

#[async_trait]
impl<T: Send + Clone> Stage<T> for SplitStage<T> {
    async fn effect(&mut self, ctx: &PipelineContext, item: &mut T) -> Result<()> {
        let Some(side) = self.side.clone() else {
            return Ok(()); // side consumer went away earlier
        };

        if self.blocking {
            tokio::select! {
                sent = side.send(item.clone()) => {
                    if sent.is_err() {
                        self.side = None;
                    }
                    Ok(())
                }
                cause = ctx.wait_cancelled() => {
                    Err(PicastError::Cancelled(cause.to_string()))
                }
            }
        } else {
            match side.try_send(item.clone()) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.side = None;
                    Ok(())
                }
            }
        }
    }

    fn teardown(&mut self, _cause: &PicastError) {
        self.side.take(); // closes the side channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{cancel_context, pipeline};
    use tokio::time::{Duration, Instant};

    #[tokio::test(start_paused = true)]
    async fn throttle_paces_a_pipeline() {
        let throttle = ThrottleStage::new(100.0, 1);
        let (head_tx, head_rx) = mpsc::channel(64);
        let ctx = PipelineContext::background();
        let (mut tail, _errors) = pipeline::<u32>(&ctx, head_rx, vec![Box::new(throttle)]);

        for i in 0..50u32 {
            head_tx.send(i).await.unwrap();
        }
        drop(head_tx);

        let start = Instant::now();
        let mut received = 0;
        while tail.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 50);
        // 49 tokens beyond the initial burst at 100/s.
        assert!(start.elapsed() >= Duration::from_millis(480));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_handle_raises_limit_mid_flight() {
        let throttle = ThrottleStage::new(1.0, 1);
        let handle = throttle.handle();
        let (head_tx, head_rx) = mpsc::channel(16);
        let ctx = PipelineContext::background();
        let (mut tail, _errors) = pipeline::<u32>(&ctx, head_rx, vec![Box::new(throttle)]);

        for i in 0..10u32 {
            head_tx.send(i).await.unwrap();
        }
        drop(head_tx);

        assert_eq!(tail.recv().await, Some(0));
        handle.set_limit(f64::INFINITY);

        let start = Instant::now();
        let mut rest = 0;
        while tail.recv().await.is_some() {
            rest += 1;
        }
        assert_eq!(rest, 9);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn pauser_holds_items_until_resumed() {
        let pauser = PauserStage::new();
        let handle = pauser.handle();
        let (head_tx, head_rx) = mpsc::channel(4);
        let ctx = PipelineContext::background();
        let (mut tail, _errors) = pipeline::<u32>(&ctx, head_rx, vec![Box::new(pauser)]);

        head_tx.send(42).await.unwrap();

        tokio::select! {
            _ = tail.recv() => panic!("paused pipeline must not deliver"),
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }

        handle.set_paused(false);
        assert_eq!(tail.recv().await, Some(42));

        drop(head_tx);
        assert_eq!(tail.recv().await, None);
    }

    #[tokio::test]
    async fn blocking_split_preserves_every_item() {
        let (split, mut side) = split_stage::<u32>(2, true);
        let (head_tx, head_rx) = mpsc::channel(8);
        let ctx = PipelineContext::background();
        let (mut tail, _errors) = pipeline(&ctx, head_rx, vec![Box::new(split) as _]);

        let feeder = tokio::spawn(async move {
            for i in 0..100u32 {
                head_tx.send(i).await.unwrap();
            }
        });

        // Consume both paths concurrently; every item appears on each.
        let mut main_items = Vec::new();
        let mut side_items = Vec::new();
        while main_items.len() < 100 || side_items.len() < 100 {
            tokio::select! {
                Some(i) = tail.recv(), if main_items.len() < 100 => main_items.push(i),
                Some(i) = side.recv(), if side_items.len() < 100 => side_items.push(i),
            }
        }
        feeder.await.unwrap();

        assert_eq!(main_items, (0..100).collect::<Vec<_>>());
        assert_eq!(side_items, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn non_blocking_split_drops_instead_of_stalling() {
        let (split, mut side) = split_stage::<u32>(1, false);
        let (head_tx, head_rx) = mpsc::channel(64);
        let ctx = PipelineContext::background();
        let (mut tail, _errors) = pipeline(&ctx, head_rx, vec![Box::new(split) as _]);

        // Nobody reads the side channel while the main path drains fully.
        for i in 0..50u32 {
            head_tx.send(i).await.unwrap();
        }
        drop(head_tx);

        let mut main_count = 0;
        while tail.recv().await.is_some() {
            main_count += 1;
        }
        assert_eq!(main_count, 50);

        // The side channel saw at most its buffer's worth, then closed.
        let mut side_count = 0;
        while side.recv().await.is_some() {
            side_count += 1;
        }
        assert!(side_count <= 1 + 1, "side received {side_count}");
    }

    #[tokio::test]
    async fn split_side_channel_closes_on_teardown() {
        let (split, mut side) = split_stage::<u32>(4, true);
        let (head_tx, head_rx) = mpsc::channel(4);
        let ctx = PipelineContext::background();
        let (mut tail, _errors) = pipeline(&ctx, head_rx, vec![Box::new(split) as _]);

        head_tx.send(1u32).await.unwrap();
        drop(head_tx);

        assert_eq!(tail.recv().await, Some(1));
        assert_eq!(side.recv().await, Some(1));
        assert_eq!(tail.recv().await, None);
        assert_eq!(side.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_split_honors_cancellation() {
        let (split, _side) = split_stage::<u32>(1, true);
        let (head_tx, head_rx) = mpsc::channel(8);
        let (cancel, ctx) = cancel_context();
        let (mut tail, mut errors) = pipeline(&ctx, head_rx, vec![Box::new(split) as _]);

        // Fill the side buffer; the next item blocks the split effect.
        head_tx.send(1u32).await.unwrap();
        head_tx.send(2).await.unwrap();
        head_tx.send(3).await.unwrap();
        assert_eq!(tail.recv().await, Some(1));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel(PicastError::Cancelled("observer gone".into()));

        // The blocked effect unwinds; no stage error is surfaced.
        while tail.recv().await.is_some() {}
        assert!(errors.recv().await.is_none());
        drop(head_tx);
    }
}
