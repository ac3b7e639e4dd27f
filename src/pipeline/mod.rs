//! Backpressured staged data pipeline.
//!
//! A pipeline moves items from a caller-owned head channel through N
//! [`Stage`]s to a tail channel the library owns. Every stage runs on its
//! own task and talks to its neighbors only through bounded channels, so a
//! slow consumer exerts backpressure all the way to the head.
//!
//! The caller keeps the sending half of the head and MUST eventually drop it
//! (or cancel the context): head closure is the reliable way to tear the
//! pipeline down. The tail is closed exactly once, after the last stage has
//! been torn down.
//!
//! When a stage effect fails, the stage publishes the error on the error
//! channel, closes its output (tearing down everything after it), and enters
//! *sink mode*: it keeps consuming from its predecessor at a throttled
//! cadence without doing work, so upstream stages are never blocked on a
//! full channel while the chain drains. Callers must read both the error
//! channel and the tail.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::error::{PicastError, Result};

/// Throttle, pause, and fan-out stages
pub mod stages;

/// Token-bucket rate limiter
pub mod limit;

pub use limit::RateLimiter;
pub use stages::{split_stage, PauserHandle, PauserStage, SplitStage, ThrottleHandle, ThrottleStage};

/// Pause between upstream polls while a stage drains in sink mode.
const SINK_POLL_INTERVAL: Duration = Duration::from_millis(15);

type CauseSlot = Option<Arc<PicastError>>;

/// Cancels an associated [`PipelineContext`] with a cause.
///
/// Only the first cancellation's cause is kept.
#[derive(Clone)]
pub struct PipelineCancel {
    tx: Arc<watch::Sender<CauseSlot>>,
}

impl PipelineCancel {
    /// Cancels the context. Later calls keep the original cause.
    pub fn cancel(&self, cause: PicastError) {
        self.cancel_arc(Arc::new(cause));
    }

    fn cancel_arc(&self, cause: Arc<PicastError>) {
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(cause);
                true
            } else {
                false
            }
        });
    }
}

/// Cooperative cancellation scope with a cause, observed by every stage.
#[derive(Clone)]
pub struct PipelineContext {
    rx: watch::Receiver<CauseSlot>,
}

impl PipelineContext {
    /// The cancellation cause, if this context has been cancelled.
    pub fn cancelled(&self) -> Option<Arc<PicastError>> {
        self.rx.borrow().clone()
    }

    /// Waits until the context is cancelled.
    ///
    /// If the cancel handle is dropped without firing, the context can
    /// never cancel and this future never resolves.
    pub async fn wait_cancelled(&self) -> Arc<PicastError> {
        let mut rx = self.rx.clone();
        loop {
            if let Some(cause) = rx.borrow_and_update().clone() {
                return cause;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// A context that is never cancelled.
    pub fn background() -> PipelineContext {
        let (_cancel, ctx) = cancel_context();
        ctx
    }

    /// Derives a child scope: cancelling the parent cancels the child, and
    /// the child can also be cancelled on its own.
    fn child(&self) -> (PipelineCancel, PipelineContext) {
        let (cancel, ctx) = cancel_context();

        let parent = self.clone();
        let tx = cancel.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                cause = parent.wait_cancelled() => {
                    PipelineCancel { tx: tx.clone() }.cancel_arc(cause);
                }
                // Every receiver gone: the child scope is finished with.
                _ = tx.closed() => {}
            }
        });

        (cancel, ctx)
    }
}

/// A pair of cancel handle and context.
pub fn cancel_context() -> (PipelineCancel, PipelineContext) {
    let (tx, rx) = watch::channel(None);
    (PipelineCancel { tx: Arc::new(tx) }, PipelineContext { rx })
}

/// One processing step in a pipeline.
#[async_trait]
pub trait Stage<T: Send>: Send {
    /// Runs for every item flowing through the stage.
    ///
    /// Blocking calls should be interrupted by `ctx` cancellation, and on
    /// cancellation the effect should return a cancellation-kind error
    /// (see [`PicastError::is_cancellation`]).
    async fn effect(&mut self, ctx: &PipelineContext, item: &mut T) -> Result<()>;

    /// Capacity of this stage's output channel. The final stage's output is
    /// the tail buffer. Values below 1 are treated as 1.
    fn output_buffer_size(&self) -> usize {
        1
    }

    /// Releases stage resources. Called exactly once, from the stage's own
    /// task, after its output has been closed; never concurrently with
    /// `effect`. The cause is either the effect's error or a
    /// cancellation-kind shutdown cause.
    fn teardown(&mut self, cause: &PicastError) {
        let _ = cause;
    }
}

/// Builds and starts a pipeline from `head` through `stages`.
///
/// Returns the tail and the error channel. The error channel is buffered to
/// `1 + stages.len()` so no stage ever blocks while reporting; each stage
/// reports at most one error, and cancellation-kind causes are not reported
/// at all. An error on the channel means the pipeline is draining: close the
/// head (or cancel `ctx`) and read the tail to completion.
pub fn pipeline<T: Send + 'static>(
    ctx: &PipelineContext,
    head: mpsc::Receiver<T>,
    stages: Vec<Box<dyn Stage<T>>>,
) -> (mpsc::Receiver<T>, mpsc::Receiver<PicastError>) {
    let (err_tx, err_rx) = mpsc::channel(1 + stages.len());

    // Pipeline-scoped cancellation: fires on external cancel or head close.
    let (cancel_stages, stage_ctx) = ctx.child();

    if stages.is_empty() {
        let (tail_tx, tail_rx) = mpsc::channel(1);
        tokio::spawn(run_pre_stage(stage_ctx, head, tail_tx, cancel_stages));
        return (tail_rx, err_rx);
    }

    let (first_tx, first_rx) = mpsc::channel(1);
    tokio::spawn(run_pre_stage(
        stage_ctx.clone(),
        head,
        first_tx,
        cancel_stages,
    ));

    let mut prev = first_rx;
    for stage in stages {
        let capacity = stage.output_buffer_size().max(1);
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(run_stage(
            stage_ctx.clone(),
            prev,
            tx,
            stage,
            err_tx.clone(),
        ));
        prev = rx;
    }

    (prev, err_rx)
}

/// Stage "-1": forwards head items into the first stage, converts head
/// closure into a pipeline-scoped cancellation so stages blocked in effects
/// can unwind, and stops forwarding once the scope is cancelled.
async fn run_pre_stage<T: Send>(
    ctx: PipelineContext,
    mut head: mpsc::Receiver<T>,
    next: mpsc::Sender<T>,
    cancel_stages: PipelineCancel,
) {
    loop {
        if ctx.cancelled().is_some() {
            return; // dropping `next` starts the teardown cascade
        }

        tokio::select! {
            _ = ctx.wait_cancelled() => return,
            received = head.recv() => {
                let Some(item) = received else {
                    cancel_stages
                        .cancel(PicastError::PipelineClosing("head closed".into()));
                    return;
                };
                if next.send(item).await.is_err() {
                    return;
                }
            }
        }
    }
}

enum StageExit {
    Cancelled(Arc<PicastError>),
    UpstreamClosed,
    DownstreamGone,
    Effect(PicastError),
}

async fn run_stage<T: Send + 'static>(
    ctx: PipelineContext,
    mut prev: mpsc::Receiver<T>,
    next: mpsc::Sender<T>,
    mut stage: Box<dyn Stage<T>>,
    err_tx: mpsc::Sender<PicastError>,
) {
    let exit = loop {
        if let Some(cause) = ctx.cancelled() {
            break StageExit::Cancelled(cause);
        }

        let Some(mut item) = prev.recv().await else {
            // Predecessor is gone; continue the teardown from here onward.
            break StageExit::UpstreamClosed;
        };

        match stage.effect(&ctx, &mut item).await {
            Ok(()) => {
                if next.send(item).await.is_err() {
                    break StageExit::DownstreamGone;
                }
            }
            Err(e) => break StageExit::Effect(e),
        }
    };

    // Output closes first so stages after this one begin their teardown,
    // then this stage's own teardown runs, exactly once.
    drop(next);

    let sink = match exit {
        StageExit::Effect(e) => {
            let publish = !e.is_cancellation();
            stage.teardown(&e);
            if publish {
                // Capacity covers one error per stage; this cannot block.
                let _ = err_tx.try_send(e);
            }
            true
        }
        StageExit::Cancelled(cause) => {
            stage.teardown(&cause);
            true
        }
        StageExit::UpstreamClosed => {
            stage.teardown(&PicastError::PipelineClosing("upstream closed".into()));
            false
        }
        StageExit::DownstreamGone => {
            stage.teardown(&PicastError::PipelineClosing("tail dropped".into()));
            true
        }
    };

    if !sink {
        return;
    }

    // Sink mode: consume from the predecessor at a throttled cadence until
    // it closes, so the chain can drain without anyone blocking.
    loop {
        match prev.recv().await {
            None => return,
            Some(_) => tokio::time::sleep(SINK_POLL_INTERVAL).await,
        }
    }
}
