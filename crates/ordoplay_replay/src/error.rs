// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for the replay engine.

use crate::clip::ClipId;
use crate::sequence::SequenceId;
use std::path::PathBuf;
use thiserror::Error;

/// Error raised by an authored step generator while producing a step
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StepError {
    /// Human readable failure description
    pub message: String,
}

impl StepError {
    /// Create a step error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced to the host from a drive
#[derive(Debug, Clone, Error)]
pub enum ReplayError {
    /// The generator failed while producing the step for a clip
    #[error("sequence '{sequence}' failed to produce a step for clip {clip}: {source}")]
    StepGeneration {
        /// Sequence label
        sequence: String,
        /// Clip that demanded the step
        clip: ClipId,
        /// Authoring error
        #[source]
        source: StepError,
    },

    /// More than one clip contains the playhead and the policy rejects it
    #[error("sequence '{sequence}' has overlapping clips {first} and {second} at t={time}")]
    OverlappingClips {
        /// Sequence label
        sequence: String,
        /// Clip honored first in start order
        first: ClipId,
        /// Clip overlapping it
        second: ClipId,
        /// Playhead time
        time: f64,
    },

    /// The generator failed during a duration probe
    #[error("sequence '{sequence}' failed while probing step durations: {source}")]
    ProbeFailed {
        /// Sequence label
        sequence: String,
        /// Authoring error
        #[source]
        source: StepError,
    },

    /// The player stopped driving after an earlier generator failure
    #[error("sequence '{0}' is halted after a step generation failure")]
    Halted(String),

    /// The drive task panicked or was torn down by the runtime
    #[error("drive task for sequence {0} did not complete")]
    DriveAborted(SequenceId),
}

/// Result type for drive operations
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The config text is not valid RON
    #[error("invalid replay config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}
