// SPDX-License-Identifier: MIT OR Apache-2.0
//! Recording fixtures shared by the unit tests.

use crate::error::StepError;
use crate::sequence::{Sequence, SequenceId, Step, StepFuture, StepGenerator};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared log of contract calls
#[derive(Debug, Clone, Default)]
pub(crate) struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.log.lock().push(entry.into());
    }

    /// Drain the whole log
    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock())
    }

    /// Drain the log, keeping lifecycle calls and evaluations only
    pub(crate) fn take_effects(&self) -> Vec<String> {
        self.take()
            .into_iter()
            .filter(|e| !e.ends_with(".dispose") && e != "define")
            .collect()
    }

    pub(crate) fn count(&self, entry: &str) -> usize {
        self.log.lock().iter().filter(|e| *e == entry).count()
    }
}

pub(crate) struct RecordingStep {
    recorder: Recorder,
    label: String,
    duration: f64,
}

impl RecordingStep {
    pub(crate) fn new(recorder: Recorder, label: impl Into<String>, duration: f64) -> Self {
        Self {
            recorder,
            label: label.into(),
            duration,
        }
    }
}

impl Step for RecordingStep {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn evaluate(&mut self, progress: f64) {
        self.recorder.push(format!("{}({})", self.label, progress));
    }

    fn dispose(&mut self) {
        self.recorder.push(format!("{}.dispose", self.label));
    }
}

/// Suspends one generator advance until released
#[derive(Clone, Default)]
pub(crate) struct Gate {
    armed: Arc<AtomicBool>,
    pub(crate) entered: Arc<Notify>,
    pub(crate) release: Arc<Notify>,
}

impl Gate {
    fn trip(&self) -> bool {
        self.armed.swap(false, Ordering::AcqRel)
    }
}

/// Sequence whose steps record every evaluation
pub(crate) struct RecordingSequence {
    id: SequenceId,
    name: String,
    recorder: Recorder,
    steps: Vec<(String, f64)>,
    gate: Option<(usize, Gate)>,
    fail_at: Option<usize>,
    runs: AtomicUsize,
}

impl RecordingSequence {
    pub(crate) fn new(recorder: Recorder, name: &str, steps: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self::build(recorder, name, steps))
    }

    /// Distinct object reusing an existing sequence id
    pub(crate) fn with_id(
        recorder: Recorder,
        name: &str,
        steps: &[(&str, f64)],
        id: SequenceId,
    ) -> Arc<Self> {
        let mut sequence = Self::build(recorder, name, steps);
        sequence.id = id;
        Arc::new(sequence)
    }

    /// Suspend the first advance that would yield step `index`
    pub(crate) fn gated(
        recorder: Recorder,
        name: &str,
        steps: &[(&str, f64)],
        index: usize,
    ) -> (Arc<Self>, Gate) {
        let gate = Gate::default();
        gate.armed.store(true, Ordering::Release);
        let mut sequence = Self::build(recorder, name, steps);
        sequence.gate = Some((index, gate.clone()));
        (Arc::new(sequence), gate)
    }

    /// Fail when asked for step `index`
    pub(crate) fn failing(
        recorder: Recorder,
        name: &str,
        steps: &[(&str, f64)],
        index: usize,
    ) -> Arc<Self> {
        let mut sequence = Self::build(recorder, name, steps);
        sequence.fail_at = Some(index);
        Arc::new(sequence)
    }

    fn build(recorder: Recorder, name: &str, steps: &[(&str, f64)]) -> Self {
        Self {
            id: SequenceId::new(),
            name: name.to_string(),
            recorder,
            steps: steps.iter().map(|(l, d)| ((*l).to_string(), *d)).collect(),
            gate: None,
            fail_at: None,
            runs: AtomicUsize::new(0),
        }
    }

    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::Acquire)
    }
}

impl Sequence for RecordingSequence {
    fn id(&self) -> SequenceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&self) {
        self.recorder.push("prepare");
    }

    fn define(&self) -> Box<dyn StepGenerator> {
        self.runs.fetch_add(1, Ordering::AcqRel);
        self.recorder.push("define");
        Box::new(RecordingGenerator {
            recorder: self.recorder.clone(),
            steps: self.steps.clone(),
            next: 0,
            gate: self.gate.clone(),
            fail_at: self.fail_at,
        })
    }

    fn cleanup(&self) {
        self.recorder.push("cleanup");
    }
}

struct RecordingGenerator {
    recorder: Recorder,
    steps: Vec<(String, f64)>,
    next: usize,
    gate: Option<(usize, Gate)>,
    fail_at: Option<usize>,
}

impl StepGenerator for RecordingGenerator {
    fn next_step(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let index = self.next;
            if let Some((at, gate)) = &self.gate {
                if *at == index && gate.trip() {
                    gate.entered.notify_one();
                    gate.release.notified().await;
                }
            }
            if self.fail_at == Some(index) {
                return Err(StepError::new(format!("no step {index}")));
            }
            let Some((label, duration)) = self.steps.get(index).cloned() else {
                return Ok(None);
            };
            self.next += 1;
            let step: Box<dyn Step> =
                Box::new(RecordingStep::new(self.recorder.clone(), label, duration));
            Ok(Some(step))
        })
    }
}
