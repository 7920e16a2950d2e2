// SPDX-License-Identifier: MIT OR Apache-2.0
//! Orchestration of every sequence driven by a host timeline.
//!
//! The orchestrator owns the sequence → player registry. Each host tick
//! hands it the complete set of clip declarations; it merges them per
//! sequence and issues exactly one drive per sequence, each on its own
//! tokio task so a sequence suspended in authored async work never holds
//! up the others.

use crate::clip::{merge_declarations, ClipDeclaration};
use crate::config::ReplayConfig;
use crate::error::{ReplayError, Result};
use crate::player::{DriveOutcome, PlayerState, SequencePlayer};
use crate::sequence::{SequenceId, SequenceRef};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Outcome of one sequence's drive within a tick
#[derive(Debug, Clone)]
pub struct SequenceOutcome {
    /// Driven sequence
    pub sequence: SequenceId,
    /// Sequence label
    pub name: String,
    /// What the drive did
    pub result: Result<DriveOutcome>,
}

/// Everything that happened during one tick
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Tick number, starting at 1
    pub tick: u64,
    /// Playhead time of the tick
    pub time: f64,
    /// One entry per driven sequence, in declaration order
    pub outcomes: Vec<SequenceOutcome>,
}

impl TickReport {
    /// Errors surfaced by this tick's drives
    pub fn errors(&self) -> impl Iterator<Item = &ReplayError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    /// Whether every drive finished without an error
    pub fn is_clean(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Outcome for `sequence`, if it was driven this tick
    pub fn outcome(&self, sequence: SequenceId) -> Option<&SequenceOutcome> {
        self.outcomes.iter().find(|o| o.sequence == sequence)
    }
}

type PendingTick = Shared<BoxFuture<'static, TickReport>>;

/// Completion signal for one tick; resolves once all of its drives settled
#[must_use = "drives run regardless, but the report is lost if the handle is dropped"]
pub struct TickHandle {
    pending: PendingTick,
}

impl Future for TickHandle {
    type Output = TickReport;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.pending).poll(cx)
    }
}

/// Registry of sequence players driven once per host tick
pub struct Orchestrator {
    config: ReplayConfig,
    players: Mutex<IndexMap<SequenceId, Arc<SequencePlayer>>>,
    latest: Mutex<Option<PendingTick>>,
    ticks: AtomicU64,
}

impl Orchestrator {
    /// Create an empty orchestrator
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            players: Mutex::new(IndexMap::new()),
            latest: Mutex::new(None),
            ticks: AtomicU64::new(0),
        }
    }

    /// Config shared by every player
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Number of registered players
    pub fn len(&self) -> usize {
        self.players.lock().len()
    }

    /// Whether no player is registered
    pub fn is_empty(&self) -> bool {
        self.players.lock().is_empty()
    }

    /// Player registered for `sequence`
    pub fn player(&self, sequence: SequenceId) -> Option<Arc<SequencePlayer>> {
        self.players.lock().get(&sequence).cloned()
    }

    /// State of the player for `sequence`; waits for its in-flight drive
    pub async fn player_state(&self, sequence: SequenceId) -> Option<PlayerState> {
        let player = self.player(sequence)?;
        Some(player.state().await)
    }

    /// Drive every declared sequence to `time`.
    ///
    /// `declarations` must be the complete set for this tick. Must be called
    /// from within a tokio runtime; the drives start immediately whether or
    /// not the returned handle is awaited.
    pub fn tick(
        &self,
        time: f64,
        declarations: impl IntoIterator<Item = ClipDeclaration>,
    ) -> TickHandle {
        let tick = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        let sets = merge_declarations(declarations);

        let mut drives = Vec::with_capacity(sets.len());
        {
            let mut players = self.players.lock();
            for (id, set) in sets {
                let player = self.bind_player(&mut players, &set.target);
                let name = player.name().to_string();
                let clips = set.clips;
                let token = player.begin();
                let task = tokio::spawn(async move { player.drive(token, time, &clips).await });
                drives.push((id, name, task));
            }
        }

        if self.config.trace_drives {
            tracing::debug!(tick, time, sequences = drives.len(), "Tick dispatched");
        }

        let pending = async move {
            let outcomes = join_all(drives.into_iter().map(|(sequence, name, task)| async move {
                let result = match task.await {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::error!(sequence = %name, "Drive task failed: {err}");
                        Err(ReplayError::DriveAborted(sequence))
                    }
                };
                SequenceOutcome {
                    sequence,
                    name,
                    result,
                }
            }))
            .await;
            TickReport {
                tick,
                time,
                outcomes,
            }
        }
        .boxed()
        .shared();

        *self.latest.lock() = Some(pending.clone());
        TickHandle { pending }
    }

    /// Wait for every drive of the latest tick; `None` if nothing was ticked since the last reset
    pub async fn settled(&self) -> Option<TickReport> {
        let pending = self.latest.lock().clone();
        match pending {
            Some(pending) => Some(pending.await),
            None => None,
        }
    }

    /// Collect the step durations of `target` without applying anything
    pub async fn probe(&self, target: &SequenceRef) -> Result<Vec<f64>> {
        let player = {
            let mut players = self.players.lock();
            self.bind_player(&mut players, target)
        };
        player.probe_durations().await
    }

    /// Restore every sequence to its baseline and forget all players
    pub async fn reset(&self) {
        let players: Vec<_> = self.players.lock().drain(..).map(|(_, p)| p).collect();
        let count = players.len();
        for player in players {
            player.reset().await;
        }
        *self.latest.lock() = None;
        tracing::info!("Replay orchestrator reset ({count} sequences)");
    }

    /// Player for `target`, replacing one bound to a different object with the same id
    fn bind_player(
        &self,
        players: &mut IndexMap<SequenceId, Arc<SequencePlayer>>,
        target: &SequenceRef,
    ) -> Arc<SequencePlayer> {
        let id = target.id();
        if let Some(existing) = players.get(&id) {
            if existing.is_bound_to(target) {
                return Arc::clone(existing);
            }
            tracing::info!(sequence = %existing.name(), "Sequence target replaced, recreating its player");
            retire(Arc::clone(existing));
        }

        let player = Arc::new(SequencePlayer::new(Arc::clone(target), self.config.clone()));
        players.insert(id, Arc::clone(&player));
        player
    }
}

/// Reset a player that is no longer registered
fn retire(player: Arc<SequencePlayer>) {
    if !player.try_reset() {
        tokio::spawn(async move { player.reset().await });
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(ReplayConfig::default())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        for player in self.players.get_mut().values() {
            if !player.try_reset() {
                tracing::warn!(sequence = %player.name(), "Player still driving on drop, baseline not restored");
            }
        }
    }
}
