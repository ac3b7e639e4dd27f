//! Actor lifecycle plumbing: the [`Actor`] contract, one-shot
//! [`InterruptLatch`]es, and the [`ActorGroup`] supervisor.
//!
//! Every long-lived component (RTSP server, RTP server, HTTP endpoint,
//! console) runs to completion under the group. The first actor to exit,
//! cleanly or not, interrupts all the others with its exit cause, and the
//! group waits for everyone before returning that cause.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::error::{PicastError, Result};

/// A shutdown cause, shared across every actor being interrupted.
pub type Cause = Arc<PicastError>;

/// A one-shot interrupt flag carrying its cause.
///
/// The first `interrupt` call wins; later calls are no-ops. Any number of
/// tasks can `wait` on the latch concurrently.
#[derive(Clone)]
pub struct InterruptLatch {
    tx: Arc<watch::Sender<Option<Cause>>>,
}

impl InterruptLatch {
    /// An unfired latch.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        InterruptLatch { tx: Arc::new(tx) }
    }

    /// Fires the latch with `cause`. Returns true iff this call fired it.
    pub fn interrupt(&self, cause: Cause) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(cause);
                true
            } else {
                false
            }
        })
    }

    /// The cause the latch fired with, if it has.
    pub fn cause(&self) -> Option<Cause> {
        self.tx.borrow().clone()
    }

    /// Waits until the latch fires and returns the cause.
    pub async fn wait(&self) -> Cause {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(cause) = rx.borrow_and_update().clone() {
                return cause;
            }
            if rx.changed().await.is_err() {
                // The sender lives inside this latch, so this only happens
                // if the latch itself was dropped mid-wait.
                return Arc::new(PicastError::Interrupted("interrupt latch dropped".into()));
            }
        }
    }
}

impl Default for InterruptLatch {
    fn default() -> Self {
        InterruptLatch::new()
    }
}

/// A long-lived component with a blocking `run` and an idempotent,
/// at-most-once `interrupt`.
#[async_trait]
pub trait Actor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Runs the actor to completion. A clean interrupt returns `Ok`.
    async fn run(&self) -> Result<()>;

    /// Asks the actor to stop, carrying the cause. Must be idempotent.
    fn interrupt(&self, cause: Cause);
}

/// Supervises a set of actors: runs them all, and when the first one exits,
/// interrupts the rest with that exit's cause.
#[derive(Default)]
pub struct ActorGroup {
    actors: Vec<Arc<dyn Actor>>,
}

impl ActorGroup {
    /// An empty group.
    pub fn new() -> Self {
        ActorGroup::default()
    }

    /// Adds an actor to the group.
    pub fn add(&mut self, actor: Arc<dyn Actor>) {
        self.actors.push(actor);
    }

    /// Runs every actor until the first exits, interrupts the rest with the
    /// first exit's cause, waits for all, and returns that cause.
    pub async fn run(self) -> Cause {
        let mut set: JoinSet<(&'static str, Result<()>)> = JoinSet::new();
        for actor in &self.actors {
            let actor = actor.clone();
            set.spawn(async move {
                let name = actor.name();
                (name, actor.run().await)
            });
        }

        info!("starting actor group ({} actors)", self.actors.len());

        let cause: Cause = match set.join_next().await {
            Some(Ok((name, Ok(())))) => {
                info!("actor {name} exited cleanly");
                Arc::new(PicastError::Interrupted(format!("{name} actor exited")))
            }
            Some(Ok((name, Err(e)))) => {
                if e.is_cancellation() {
                    info!("actor {name} exited: {e}");
                } else {
                    error!("actor {name} failed: {e}");
                }
                Arc::new(e)
            }
            Some(Err(join_err)) => {
                error!("actor task aborted: {join_err}");
                Arc::new(PicastError::Interrupted(format!(
                    "actor task aborted: {join_err}"
                )))
            }
            None => Arc::new(PicastError::Interrupted("empty actor group".into())),
        };

        for actor in &self.actors {
            actor.interrupt(cause.clone());
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => info!("actor {name} stopped"),
                Ok((name, Err(e))) if e.is_cancellation() => info!("actor {name} stopped: {e}"),
                Ok((name, Err(e))) => warn!("actor {name} stopped with error: {e}"),
                Err(join_err) => warn!("actor task aborted during shutdown: {join_err}"),
            }
        }

        info!("actor group exited: {cause}");
        cause
    }
}

/// Translates the process interrupt signal (ctrl-c) into a group shutdown.
pub struct SignalTrap {
    latch: InterruptLatch,
}

impl SignalTrap {
    /// A trap ready to be added to a group.
    pub fn new() -> Self {
        SignalTrap {
            latch: InterruptLatch::new(),
        }
    }
}

impl Default for SignalTrap {
    fn default() -> Self {
        SignalTrap::new()
    }
}

#[async_trait]
impl Actor for SignalTrap {
    fn name(&self) -> &'static str {
        "signal-trap"
    }

    async fn run(&self) -> Result<()> {
        tokio::select! {
            _ = self.latch.wait() => Ok(()),
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("interrupt signal received");
                Err(PicastError::Interrupted("interrupt signal".into()))
            }
        }
    }

    fn interrupt(&self, cause: Cause) {
        self.latch.interrupt(cause);
    }
}
