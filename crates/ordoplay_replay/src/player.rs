// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-sequence replay state machine.
//!
//! A player reconciles one sequence with a requested playhead time. Clips
//! fully behind the playhead are finalized at progress 1, the clip under the
//! playhead is evaluated at its partial progress, and later clips are left
//! alone. Because the generator only moves forward, anything that breaks
//! continuity with what was already applied (a backward scrub, a reshuffled
//! clip list) is handled by unwinding to the baseline and replaying from a
//! fresh run.
//!
//! Drives of one player are serialized behind an async mutex. Each drive
//! takes a cancellation token before queuing, so a newer drive makes every
//! queued or suspended older one stale.

use crate::cancel::{CancellationIssuer, CancellationToken};
use crate::clip::{Clip, ClipId, ClipWindow};
use crate::config::{OverlapPolicy, ReplayConfig};
use crate::error::{ReplayError, Result};
use crate::sequence::{SequenceBinding, SequenceId, SequencePhase, SequenceRef, Step, StepGenerator};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lifecycle state of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    /// Never driven
    #[default]
    Idle,
    /// Sequence restored to its baseline
    Cleaned,
    /// A run is in progress
    Playing,
    /// The run produced its last step, or failed
    Done,
}

/// What a finished drive did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// Playhead is before every clip; the baseline is in place
    Baseline,
    /// The state for the requested time was applied
    Applied,
    /// The generator ran out of steps before every clip had one
    Exhausted,
    /// A newer drive took over; nothing was changed after that point
    Superseded,
}

/// Result of asking the generator for one more step
enum Advance {
    Step(Box<dyn Step>),
    Exhausted,
    Superseded,
}

/// A step bound to the clip it animates
struct BoundStep {
    clip: ClipId,
    step: Box<dyn Step>,
}

struct PlayerInner {
    binding: SequenceBinding,
    state: PlayerState,
    generator: Option<Box<dyn StepGenerator>>,
    completed: Vec<ClipId>,
    active: Option<BoundStep>,
    /// Step produced for a drive that was superseded while waiting for it
    prefetched: Option<Box<dyn Step>>,
    fault: Option<ReplayError>,
}

impl PlayerInner {
    fn new(target: SequenceRef) -> Self {
        Self {
            binding: SequenceBinding::new(target),
            state: PlayerState::Idle,
            generator: None,
            completed: Vec::new(),
            active: None,
            prefetched: None,
            fault: None,
        }
    }

    fn name(&self) -> &str {
        self.binding.target().name()
    }

    /// Dispose every step and the generator
    fn release(&mut self) {
        if let Some(mut step) = self.prefetched.take() {
            step.dispose();
        }
        if let Some(mut bound) = self.active.take() {
            bound.step.dispose();
        }
        if let Some(mut generator) = self.generator.take() {
            generator.dispose();
        }
        self.completed.clear();
    }

    fn reset(&mut self) {
        self.release();
        self.binding.cleanup();
        self.state = PlayerState::Cleaned;
    }

    /// Unwind to the baseline and begin a new run
    fn restart(&mut self) {
        self.release();
        if self.binding.phase() == SequencePhase::Prepared {
            self.binding.cleanup();
        }
        self.binding.prepare();
        self.generator = Some(self.binding.define());
        self.state = PlayerState::Playing;
    }

    /// Whether what was already applied is still a valid prefix of `window`
    fn is_continuous(&self, window: &ClipWindow<'_>) -> bool {
        if self.completed.len() > window.past.len() {
            return false;
        }
        let prefix_matches = self
            .completed
            .iter()
            .zip(&window.past)
            .all(|(done, clip)| *done == clip.id);
        if !prefix_matches {
            return false;
        }

        let Some(active) = &self.active else {
            return true;
        };
        match window.past.get(self.completed.len()) {
            Some(next) => active.clip == next.id,
            None => window.current.is_some_and(|c| c.id == active.clip),
        }
    }

    async fn drive(
        &mut self,
        token: &CancellationToken,
        time: f64,
        clips: &[Clip],
        config: &ReplayConfig,
    ) -> Result<DriveOutcome> {
        if self.fault.is_some() {
            return Err(ReplayError::Halted(self.name().to_string()));
        }

        let window = ClipWindow::classify(time, clips);
        if let (Some(first), Some(second)) = (window.current, window.overlapping.first()) {
            match config.overlap_policy {
                OverlapPolicy::FirstWins => {
                    for clip in &window.overlapping {
                        tracing::warn!(
                            sequence = %self.name(),
                            clip = %clip.id,
                            honored = %first.id,
                            time,
                            "Overlapping clip ignored"
                        );
                    }
                }
                OverlapPolicy::Reject => {
                    return Err(ReplayError::OverlappingClips {
                        sequence: self.name().to_string(),
                        first: first.id,
                        second: second.id,
                        time,
                    });
                }
            }
        }

        if window.is_before_start() {
            if self.state != PlayerState::Cleaned {
                if config.trace_drives {
                    tracing::debug!(sequence = %self.name(), time, "Playhead before first clip, restoring baseline");
                }
                self.reset();
            }
            return Ok(DriveOutcome::Baseline);
        }

        if self.generator.is_none() || !self.is_continuous(&window) {
            if config.trace_drives {
                tracing::debug!(
                    sequence = %self.name(),
                    time,
                    completed = self.completed.len(),
                    "Continuity lost, replaying from a fresh run"
                );
            }
            self.restart();
        }

        while self.completed.len() < window.past.len() {
            let clip = window.past[self.completed.len()];
            let mut step = match self.active.take() {
                Some(bound) => bound.step,
                None => match self.advance(token, clip).await? {
                    Advance::Step(step) => step,
                    Advance::Exhausted => return Ok(self.exhaust(clip)),
                    Advance::Superseded => return Ok(DriveOutcome::Superseded),
                },
            };
            step.evaluate(1.0);
            step.dispose();
            self.completed.push(clip.id);
        }

        if let Some(clip) = window.current {
            if self.active.is_none() {
                match self.advance(token, clip).await? {
                    Advance::Step(step) => {
                        self.active = Some(BoundStep {
                            clip: clip.id,
                            step,
                        });
                    }
                    Advance::Exhausted => return Ok(self.exhaust(clip)),
                    Advance::Superseded => return Ok(DriveOutcome::Superseded),
                }
            }
            if let Some(bound) = self.active.as_mut() {
                bound.step.evaluate(clip.progress_at(time));
            }
        }

        Ok(if self.state == PlayerState::Done {
            DriveOutcome::Exhausted
        } else {
            DriveOutcome::Applied
        })
    }

    /// Request the step for `clip`, checking the token around the suspension point
    async fn advance(&mut self, token: &CancellationToken, clip: &Clip) -> Result<Advance> {
        if token.is_stale() {
            return Ok(Advance::Superseded);
        }
        if let Some(step) = self.prefetched.take() {
            return Ok(Advance::Step(step));
        }
        if self.state == PlayerState::Done {
            return Ok(Advance::Exhausted);
        }
        let Some(generator) = self.generator.as_mut() else {
            return Ok(Advance::Exhausted);
        };

        let produced = generator.next_step().await;
        match produced {
            Ok(Some(step)) if token.is_stale() => {
                self.prefetched = Some(step);
                Ok(Advance::Superseded)
            }
            Ok(Some(step)) => Ok(Advance::Step(step)),
            Ok(None) if token.is_stale() => Ok(Advance::Superseded),
            Ok(None) => Ok(Advance::Exhausted),
            Err(source) => {
                let err = ReplayError::StepGeneration {
                    sequence: self.name().to_string(),
                    clip: clip.id,
                    source,
                };
                tracing::error!(sequence = %self.name(), clip = %clip.id, "{err}");
                self.state = PlayerState::Done;
                self.fault = Some(err.clone());
                Err(err)
            }
        }
    }

    fn exhaust(&mut self, clip: &Clip) -> DriveOutcome {
        if self.state != PlayerState::Done {
            tracing::warn!(
                sequence = %self.name(),
                clip = %clip.id,
                "Sequence has fewer steps than clips scheduled against it"
            );
            self.state = PlayerState::Done;
        }
        DriveOutcome::Exhausted
    }
}

/// Drives one sequence to requested playhead times
pub struct SequencePlayer {
    id: SequenceId,
    name: String,
    target: SequenceRef,
    config: ReplayConfig,
    issuer: CancellationIssuer,
    inner: Mutex<PlayerInner>,
}

impl SequencePlayer {
    /// Create a player bound to `target`
    pub fn new(target: SequenceRef, config: ReplayConfig) -> Self {
        Self {
            id: target.id(),
            name: target.name().to_string(),
            inner: Mutex::new(PlayerInner::new(Arc::clone(&target))),
            target,
            config,
            issuer: CancellationIssuer::new(),
        }
    }

    /// Bound sequence id
    pub fn id(&self) -> SequenceId {
        self.id
    }

    /// Bound sequence label
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this player drives exactly the object `target` points to
    pub fn is_bound_to(&self, target: &SequenceRef) -> bool {
        Arc::ptr_eq(&self.target, target)
    }

    /// Generation of the most recently issued drive token
    pub fn generation(&self) -> u64 {
        self.issuer.generation()
    }

    /// Current state; waits for an in-flight drive to settle
    pub async fn state(&self) -> PlayerState {
        self.inner.lock().await.state
    }

    /// Current state, or `None` while a drive holds the player
    pub fn try_state(&self) -> Option<PlayerState> {
        self.inner.try_lock().ok().map(|inner| inner.state)
    }

    /// Reconcile the sequence with playhead `time` over sorted `clips`.
    ///
    /// Supersedes any drive still queued or suspended on this player.
    pub async fn play_to(&self, time: f64, clips: &[Clip]) -> Result<DriveOutcome> {
        let token = self.begin();
        self.drive(token, time, clips).await
    }

    /// Claim the next drive slot, superseding every earlier one.
    ///
    /// Drives rank by the order of `begin` calls, not by when they run.
    pub fn begin(&self) -> CancellationToken {
        self.issuer.new_execution()
    }

    /// Run a drive claimed with [`Self::begin`]
    pub async fn drive(
        &self,
        token: CancellationToken,
        time: f64,
        clips: &[Clip],
    ) -> Result<DriveOutcome> {
        let mut inner = self.inner.lock().await;
        if token.is_stale() {
            return Ok(DriveOutcome::Superseded);
        }
        let outcome = inner.drive(&token, time, clips, &self.config).await;
        if self.config.trace_drives {
            tracing::debug!(sequence = %self.name, time, ?outcome, state = ?inner.state, "Drive settled");
        }
        outcome
    }

    /// Cancel pending drives, dispose everything and restore the baseline
    pub async fn reset(&self) {
        self.issuer.invalidate();
        let mut inner = self.inner.lock().await;
        inner.reset();
        inner.fault = None;
    }

    /// Reset without waiting; returns `false` if a drive holds the player
    pub fn try_reset(&self) -> bool {
        self.issuer.invalidate();
        match self.inner.try_lock() {
            Ok(mut inner) => {
                inner.reset();
                inner.fault = None;
                true
            }
            Err(_) => false,
        }
    }

    /// Run the sequence once without evaluating anything and collect step durations.
    ///
    /// Leaves the sequence at its baseline; the next drive starts a fresh run.
    pub async fn probe_durations(&self) -> Result<Vec<f64>> {
        let mut inner = self.inner.lock().await;
        inner.release();
        if inner.binding.phase() == SequencePhase::Prepared {
            inner.binding.cleanup();
        }
        inner.binding.prepare();
        let mut generator = inner.binding.define();

        let mut durations = Vec::new();
        let result = loop {
            match generator.next_step().await {
                Ok(Some(mut step)) => {
                    durations.push(step.duration());
                    step.dispose();
                }
                Ok(None) => break Ok(durations),
                Err(source) => {
                    break Err(ReplayError::ProbeFailed {
                        sequence: self.name.clone(),
                        source,
                    })
                }
            }
        };

        generator.dispose();
        inner.reset();
        if let Ok(durations) = &result {
            tracing::debug!(sequence = %self.name, steps = durations.len(), "Probed step durations");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Recorder, RecordingSequence};

    const ABC: &[(&str, f64)] = &[("A", 1.0), ("B", 1.0), ("C", 1.0)];

    fn back_to_back(count: usize) -> Vec<Clip> {
        (0..count)
            .map(|i| Clip::new(ClipId::new(), i as f64, 1.0))
            .collect()
    }

    fn player_for(sequence: SequenceRef) -> SequencePlayer {
        SequencePlayer::new(sequence, ReplayConfig::default())
    }

    #[tokio::test]
    async fn test_before_start_is_idempotent() {
        let recorder = Recorder::default();
        let player = player_for(RecordingSequence::new(recorder.clone(), "seq", ABC));
        let clips: Vec<_> = back_to_back(3)
            .into_iter()
            .map(|c| Clip::new(c.id, c.start + 5.0, c.duration))
            .collect();

        for _ in 0..3 {
            let outcome = player.play_to(1.0, &clips).await.unwrap();
            assert_eq!(outcome, DriveOutcome::Baseline);
        }

        assert_eq!(recorder.take(), vec!["cleanup"]);
        assert_eq!(player.state().await, PlayerState::Cleaned);
    }

    #[tokio::test]
    async fn test_rewind_before_start_restores_baseline_once() {
        let recorder = Recorder::default();
        let player = player_for(RecordingSequence::new(recorder.clone(), "seq", ABC));
        let clips = back_to_back(3);

        player.play_to(1.5, &clips).await.unwrap();
        recorder.take();

        for _ in 0..3 {
            let outcome = player.play_to(-1.0, &clips).await.unwrap();
            assert_eq!(outcome, DriveOutcome::Baseline);
        }

        assert_eq!(recorder.take(), vec!["B.dispose", "cleanup"]);
        assert_eq!(player.state().await, PlayerState::Cleaned);
    }

    #[tokio::test]
    async fn test_earlier_claim_is_superseded_before_it_runs() {
        let recorder = Recorder::default();
        let player = player_for(RecordingSequence::new(recorder.clone(), "seq", ABC));
        let clips = back_to_back(3);

        let older = player.begin();
        let newer = player.begin();
        assert_eq!(player.drive(newer, 0.5, &clips).await.unwrap(), DriveOutcome::Applied);
        assert_eq!(player.drive(older, 2.5, &clips).await.unwrap(), DriveOutcome::Superseded);
        assert_eq!(recorder.take_effects(), vec!["prepare", "A(0.5)"]);
    }

    #[tokio::test]
    async fn test_scrub_scenario() {
        let recorder = Recorder::default();
        let player = player_for(RecordingSequence::new(recorder.clone(), "seq", ABC));
        let clips = back_to_back(3);

        player.play_to(0.5, &clips).await.unwrap();
        assert_eq!(recorder.take_effects(), vec!["prepare", "A(0.5)"]);

        player.play_to(2.5, &clips).await.unwrap();
        assert_eq!(recorder.take_effects(), vec!["A(1)", "B(1)", "C(0.5)"]);

        player.play_to(0.2, &clips).await.unwrap();
        assert_eq!(recorder.take_effects(), vec!["cleanup", "prepare", "A(0.2)"]);
    }

    #[tokio::test]
    async fn test_forward_replay_finalizes_once() {
        let recorder = Recorder::default();
        let player = player_for(RecordingSequence::new(recorder.clone(), "seq", ABC));
        let clips = back_to_back(3);

        for time in [0.25, 0.5, 1.25, 1.5, 2.75, 3.5, 4.0] {
            player.play_to(time, &clips).await.unwrap();
        }

        let evaluations: Vec<_> = recorder
            .take_effects()
            .into_iter()
            .filter(|e| e.contains('('))
            .collect();
        assert_eq!(
            evaluations,
            vec!["A(0.25)", "A(0.5)", "A(1)", "B(0.25)", "B(0.5)", "B(1)", "C(0.75)", "C(1)"]
        );
        assert_eq!(player.state().await, PlayerState::Playing);
    }

    #[tokio::test]
    async fn test_backward_jump_restarts_once() {
        let recorder = Recorder::default();
        let steps = [("A", 1.0), ("B", 1.0), ("C", 1.0), ("D", 1.0), ("E", 1.0)];
        let sequence = RecordingSequence::new(recorder.clone(), "seq", &steps);
        let player = player_for(sequence.clone());
        let clips = back_to_back(5);

        player.play_to(2.5, &clips).await.unwrap();
        recorder.take();

        player.play_to(0.5, &clips).await.unwrap();
        let log = recorder.take();
        assert_eq!(
            log,
            vec!["C.dispose", "cleanup", "prepare", "define", "A(0.5)"]
        );
        assert_eq!(sequence.runs(), 2);
    }

    #[tokio::test]
    async fn test_clip_list_change_restarts() {
        let recorder = Recorder::default();
        let player = player_for(RecordingSequence::new(recorder.clone(), "seq", ABC));
        let clips = back_to_back(3);

        player.play_to(1.5, &clips).await.unwrap();
        recorder.take();

        let mut reordered = clips.clone();
        reordered[0].id = ClipId::new();
        player.play_to(1.5, &reordered).await.unwrap();
        assert_eq!(
            recorder.take_effects(),
            vec!["cleanup", "prepare", "A(1)", "B(0.5)"]
        );
    }

    #[tokio::test]
    async fn test_superseded_backward_drive_leaves_no_trace() {
        let recorder = Recorder::default();
        let (sequence, gate) = RecordingSequence::gated(recorder.clone(), "seq", ABC, 2);
        let player = Arc::new(player_for(sequence));
        let clips = Arc::new(back_to_back(3));

        let first = tokio::spawn({
            let (player, clips) = (player.clone(), clips.clone());
            async move { player.play_to(2.5, &clips).await }
        });
        gate.entered.notified().await;

        let second = tokio::spawn({
            let (player, clips) = (player.clone(), clips.clone());
            async move { player.play_to(0.5, &clips).await }
        });
        while player.generation() < 2 {
            tokio::task::yield_now().await;
        }
        gate.release.notify_one();

        assert_eq!(first.await.unwrap().unwrap(), DriveOutcome::Superseded);
        assert_eq!(second.await.unwrap().unwrap(), DriveOutcome::Applied);

        let effects = recorder.take_effects();
        assert_eq!(
            effects,
            vec!["prepare", "A(1)", "B(1)", "cleanup", "prepare", "A(0.5)"]
        );
    }

    #[tokio::test]
    async fn test_superseded_forward_drive_reuses_step() {
        let recorder = Recorder::default();
        let (sequence, gate) = RecordingSequence::gated(recorder.clone(), "seq", ABC, 2);
        let player = Arc::new(player_for(sequence.clone()));
        let clips = Arc::new(back_to_back(3));

        let first = tokio::spawn({
            let (player, clips) = (player.clone(), clips.clone());
            async move { player.play_to(2.5, &clips).await }
        });
        gate.entered.notified().await;

        let second = tokio::spawn({
            let (player, clips) = (player.clone(), clips.clone());
            async move { player.play_to(2.25, &clips).await }
        });
        while player.generation() < 2 {
            tokio::task::yield_now().await;
        }
        gate.release.notify_one();

        assert_eq!(first.await.unwrap().unwrap(), DriveOutcome::Superseded);
        assert_eq!(second.await.unwrap().unwrap(), DriveOutcome::Applied);
        assert_eq!(
            recorder.take_effects(),
            vec!["prepare", "A(1)", "B(1)", "C(0.25)"]
        );
        assert_eq!(sequence.runs(), 1);
    }

    #[tokio::test]
    async fn test_generator_failure_halts_player() {
        let recorder = Recorder::default();
        let sequence = RecordingSequence::failing(recorder.clone(), "broken", ABC, 1);
        let player = player_for(sequence);
        let clips = back_to_back(3);

        let err = player.play_to(1.5, &clips).await.unwrap_err();
        assert!(matches!(err, ReplayError::StepGeneration { clip, .. } if clip == clips[1].id));
        assert_eq!(player.state().await, PlayerState::Done);

        let halted = player.play_to(2.5, &clips).await.unwrap_err();
        assert!(matches!(halted, ReplayError::Halted(_)));

        player.reset().await;
        assert_eq!(player.state().await, PlayerState::Cleaned);
        assert_eq!(player.play_to(0.5, &clips).await.unwrap(), DriveOutcome::Applied);
    }

    #[tokio::test]
    async fn test_exhaustion_stops_driving() {
        let recorder = Recorder::default();
        let sequence = RecordingSequence::new(recorder.clone(), "short", &[("A", 1.0), ("B", 1.0)]);
        let player = player_for(sequence);
        let clips = back_to_back(3);

        assert_eq!(player.play_to(2.5, &clips).await.unwrap(), DriveOutcome::Exhausted);
        assert_eq!(recorder.take_effects(), vec!["prepare", "A(1)", "B(1)"]);
        assert_eq!(player.state().await, PlayerState::Done);

        assert_eq!(player.play_to(3.5, &clips).await.unwrap(), DriveOutcome::Exhausted);
        assert!(recorder.take_effects().is_empty());

        player.play_to(0.5, &clips).await.unwrap();
        assert_eq!(recorder.take_effects(), vec!["cleanup", "prepare", "A(0.5)"]);
        assert_eq!(player.state().await, PlayerState::Playing);
    }

    #[tokio::test]
    async fn test_overlap_policies() {
        let recorder = Recorder::default();
        let sequence = RecordingSequence::new(recorder.clone(), "seq", ABC);
        let clips = vec![
            Clip::new(ClipId::new(), 0.0, 2.0),
            Clip::new(ClipId::new(), 1.0, 2.0),
        ];

        let lenient = player_for(sequence.clone());
        lenient.play_to(1.0, &clips).await.unwrap();
        assert_eq!(recorder.take_effects(), vec!["prepare", "A(0.5)"]);

        let strict = SequencePlayer::new(
            sequence,
            ReplayConfig {
                overlap_policy: OverlapPolicy::Reject,
                ..ReplayConfig::default()
            },
        );
        let err = strict.play_to(1.0, &clips).await.unwrap_err();
        assert!(matches!(err, ReplayError::OverlappingClips { second, .. } if second == clips[1].id));
        assert!(recorder.take().is_empty());
    }

    #[tokio::test]
    async fn test_probe_durations_restores_baseline() {
        let recorder = Recorder::default();
        let steps = [("A", 1.0), ("B", 2.5)];
        let player = player_for(RecordingSequence::new(recorder.clone(), "seq", &steps));
        let clips = back_to_back(2);

        player.play_to(0.5, &clips).await.unwrap();
        recorder.take();

        assert_eq!(player.probe_durations().await.unwrap(), vec![1.0, 2.5]);
        assert_eq!(recorder.count("cleanup"), 2);
        assert!(recorder.take_effects().iter().all(|e| !e.contains('(')));
        assert_eq!(player.state().await, PlayerState::Cleaned);

        player.play_to(0.5, &clips).await.unwrap();
        assert_eq!(recorder.take_effects(), vec!["prepare", "A(0.5)"]);
    }

    #[test]
    fn test_player_identity() {
        let sequence: SequenceRef = RecordingSequence::new(Recorder::default(), "seq", ABC);
        let player = player_for(sequence.clone());
        assert_eq!(player.id(), sequence.id());
        assert_eq!(player.name(), "seq");
        assert!(player.is_bound_to(&sequence));

        let other: SequenceRef = RecordingSequence::new(Recorder::default(), "seq", ABC);
        assert!(!player.is_bound_to(&other));
        assert_eq!(player.try_state(), Some(PlayerState::Idle));
    }
}
