// SPDX-License-Identifier: MIT OR Apache-2.0
//! Supersession tokens for drives.
//!
//! Every drive request takes a fresh token from its player's issuer. Issuing
//! a new token makes every earlier one stale. Nothing is preempted: a stale
//! drive notices at its next check and leaves without mutating anything.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Issues cancellation tokens for one player
#[derive(Debug, Default)]
pub struct CancellationIssuer {
    generation: Arc<AtomicU64>,
}

impl CancellationIssuer {
    /// Create an issuer at generation zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate every outstanding token and return a fresh one
    pub fn new_execution(&self) -> CancellationToken {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        CancellationToken {
            generation,
            current: Arc::clone(&self.generation),
        }
    }

    /// Invalidate every outstanding token without issuing a new one
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Current generation number
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// Handle carried by one drive request
#[derive(Debug, Clone)]
pub struct CancellationToken {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl CancellationToken {
    /// Whether no newer request has been issued since this one
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }

    /// Whether a newer request superseded this one
    pub fn is_stale(&self) -> bool {
        !self.is_current()
    }

    /// Generation this token was issued at
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
