// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline scrubbing replay engine for OrdoPlay.
//!
//! Lets a host move a playhead anywhere on a timeline and have every
//! authored sequence reach exactly the state that belongs to that time:
//! - Forward scrubs continue the running sequence in place
//! - Backward scrubs unwind to the baseline and replay from a fresh run
//! - A newer request supersedes any request still in flight
//! - Clips from several tracks targeting one sequence drive it once per tick
//!
//! ## Architecture
//!
//! The engine is built on:
//! - [`Sequence`], the authored prepare/define/cleanup contract
//! - [`SequencePlayer`], the per-sequence state machine
//! - [`Orchestrator`], the per-host registry that fans out each tick
//! - [`CancellationIssuer`], generation-counted supersession tokens

pub mod cancel;
pub mod clip;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod player;
pub mod sequence;

#[cfg(test)]
pub(crate) mod test_support;

pub use cancel::{CancellationIssuer, CancellationToken};
pub use clip::{merge_declarations, Clip, ClipDeclaration, ClipId, ClipSet, ClipWindow};
pub use config::{OverlapPolicy, ReplayConfig, CONFIG_FILE_NAME};
pub use error::{ConfigError, ReplayError, Result, StepError};
pub use orchestrator::{Orchestrator, SequenceOutcome, TickHandle, TickReport};
pub use player::{DriveOutcome, PlayerState, SequencePlayer};
pub use sequence::{
    ChannelGenerator, IterGenerator, Sequence, SequenceId, SequencePhase, SequenceRef, Step,
    StepFuture, StepGenerator, StepSender,
};
