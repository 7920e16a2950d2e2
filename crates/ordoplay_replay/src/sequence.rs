// SPDX-License-Identifier: MIT OR Apache-2.0
//! The authoring contract: sequences, their step generators, and steps.

use crate::error::StepError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::iter::Fuse;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Unique identifier for a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceId(pub Uuid);

impl SequenceId {
    /// Create a new random sequence ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SequenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One yielded unit of animation
pub trait Step: Send {
    /// Intrinsic duration in seconds; fixed once the step is yielded
    fn duration(&self) -> f64;

    /// Apply the visible state for `progress` in `[0, 1]`
    fn evaluate(&mut self, progress: f64);

    /// Release anything acquired while the step was active
    fn dispose(&mut self) {}
}

/// Future returned by [`StepGenerator::next_step`]. `Ok(None)` means exhausted.
pub type StepFuture<'a> = BoxFuture<'a, Result<Option<Box<dyn Step>>, StepError>>;

/// Single-use, forward-only producer of steps
pub trait StepGenerator: Send {
    /// Resume the generator until it yields its next step
    fn next_step(&mut self) -> StepFuture<'_>;

    /// Abandon the generator
    fn dispose(&mut self) {}
}

/// An authored animation target driven by the replay engine.
///
/// `prepare` and `cleanup` must be idempotent. `cleanup` must be callable in
/// any phase, including before the first `prepare`. Every call to `define`
/// starts a new run and must yield steps in the order their effects apply.
pub trait Sequence: Send + Sync {
    /// Stable identity
    fn id(&self) -> SequenceId;

    /// Label used in diagnostics
    fn name(&self) -> &str;

    /// Establish the state the first step departs from
    fn prepare(&self);

    /// Start a new run
    fn define(&self) -> Box<dyn StepGenerator>;

    /// Restore the baseline state
    fn cleanup(&self);
}

/// Shared handle to an authored sequence
pub type SequenceRef = Arc<dyn Sequence>;

/// Where a bound sequence is in its prepare/cleanup cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencePhase {
    /// Neither prepared nor cleaned yet
    #[default]
    Untouched,
    /// `prepare` ran and no `cleanup` followed
    Prepared,
    /// Baseline restored
    Cleaned,
}

/// A sequence handle plus the phase the player last left it in.
///
/// Gates the contract calls so a run never sees a second `prepare` without
/// a `cleanup` in between.
pub(crate) struct SequenceBinding {
    target: SequenceRef,
    phase: SequencePhase,
}

impl SequenceBinding {
    pub(crate) fn new(target: SequenceRef) -> Self {
        Self {
            target,
            phase: SequencePhase::Untouched,
        }
    }

    pub(crate) fn target(&self) -> &SequenceRef {
        &self.target
    }

    pub(crate) fn phase(&self) -> SequencePhase {
        self.phase
    }

    pub(crate) fn prepare(&mut self) {
        if self.phase == SequencePhase::Prepared {
            return;
        }
        self.target.prepare();
        self.phase = SequencePhase::Prepared;
    }

    pub(crate) fn cleanup(&mut self) {
        if self.phase == SequencePhase::Cleaned {
            return;
        }
        self.target.cleanup();
        self.phase = SequencePhase::Cleaned;
    }

    pub(crate) fn define(&self) -> Box<dyn StepGenerator> {
        self.target.define()
    }
}

/// Generator over a synchronous iterator of steps
pub struct IterGenerator<I> {
    steps: Fuse<I>,
}

impl<I> IterGenerator<I>
where
    I: Iterator<Item = Box<dyn Step>> + Send,
{
    /// Wrap an iterator
    pub fn new(steps: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            steps: steps.into_iter().fuse(),
        }
    }
}

impl<I> StepGenerator for IterGenerator<I>
where
    I: Iterator<Item = Box<dyn Step>> + Send,
{
    fn next_step(&mut self) -> StepFuture<'_> {
        let step = self.steps.next();
        Box::pin(async move { Ok(step) })
    }
}

/// Sending half handed to an authoring closure run by [`ChannelGenerator`]
#[derive(Clone)]
pub struct StepSender {
    tx: mpsc::Sender<Result<Box<dyn Step>, StepError>>,
}

impl StepSender {
    /// Yield a step and wait until the player has room for it.
    ///
    /// Fails once the generator has been disposed; authoring code should
    /// return at that point.
    pub async fn yield_step(&self, step: Box<dyn Step>) -> Result<(), StepError> {
        self.tx
            .send(Ok(step))
            .await
            .map_err(|_| StepError::new("step generator was disposed"))
    }
}

/// Generator fed by an authoring task running on the tokio runtime.
///
/// The worker runs at most one step ahead of the player. Must be created
/// from within a runtime.
pub struct ChannelGenerator {
    rx: mpsc::Receiver<Result<Box<dyn Step>, StepError>>,
    worker: Option<JoinHandle<()>>,
}

impl ChannelGenerator {
    /// Spawn `author` as the worker feeding this generator
    pub fn spawn<F, Fut>(author: F) -> Self
    where
        F: FnOnce(StepSender) -> Fut,
        Fut: Future<Output = Result<(), StepError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let errors = tx.clone();
        let run = author(StepSender { tx });
        let worker = tokio::spawn(async move {
            if let Err(err) = run.await {
                // Receiver may already be gone after dispose.
                let _ = errors.send(Err(err)).await;
            }
        });

        Self {
            rx,
            worker: Some(worker),
        }
    }
}

impl StepGenerator for ChannelGenerator {
    fn next_step(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            match self.rx.recv().await {
                Some(Ok(step)) => Ok(Some(step)),
                Some(Err(err)) => Err(err),
                None => Ok(None),
            }
        })
    }

    fn dispose(&mut self) {
        self.rx.close();
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

impl Drop for ChannelGenerator {
    fn drop(&mut self) {
        self.dispose();
    }
}
