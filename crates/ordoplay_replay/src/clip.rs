// SPDX-License-Identifier: MIT OR Apache-2.0
//! Clip declarations and the per-tick clip set merge.
//!
//! Tracks declare clips independently. Before anything is driven, every
//! declaration of a tick is grouped by target sequence, deduplicated by
//! clip identity and sorted by start time, so each sequence sees one
//! ordered clip list.

use crate::sequence::{SequenceId, SequenceRef};
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for an authored clip, stable across ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClipId(pub Uuid);

impl ClipId {
    /// Create a new random clip ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A time span on the timeline bound to one step of a sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Clip identity
    pub id: ClipId,
    /// Start time in seconds
    pub start: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl Clip {
    /// Create a clip
    pub fn new(id: ClipId, start: f64, duration: f64) -> Self {
        Self {
            id,
            start,
            duration,
        }
    }

    /// End time (exclusive)
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Whether the playhead has fully passed this clip
    pub fn is_past(&self, time: f64) -> bool {
        self.end() <= time
    }

    /// Whether the playhead is inside this clip
    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time < self.end()
    }

    /// Progress of the playhead through this clip, clamped to `[0, 1]`
    pub fn progress_at(&self, time: f64) -> f64 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        ((time - self.start) / self.duration).clamp(0.0, 1.0)
    }
}

/// One clip as declared by a track during a host tick
#[derive(Clone)]
pub struct ClipDeclaration {
    /// Target sequence
    pub sequence: SequenceRef,
    /// Clip identity
    pub clip: ClipId,
    /// Start time in seconds
    pub start: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl ClipDeclaration {
    /// Declare a clip against a sequence
    pub fn new(sequence: SequenceRef, clip: ClipId, start: f64, duration: f64) -> Self {
        Self {
            sequence,
            clip,
            start,
            duration,
        }
    }

    fn to_clip(&self) -> Clip {
        let duration = if self.duration.is_finite() && self.duration >= 0.0 {
            self.duration
        } else {
            tracing::warn!(
                sequence = %self.sequence.name(),
                clip = %self.clip,
                duration = self.duration,
                "Clip has an invalid duration, treating it as zero"
            );
            0.0
        };
        Clip::new(self.clip, self.start, duration)
    }
}

impl fmt::Debug for ClipDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipDeclaration")
            .field("sequence", &self.sequence.id())
            .field("clip", &self.clip)
            .field("start", &self.start)
            .field("duration", &self.duration)
            .finish()
    }
}

/// All clips of one tick that target the same sequence
#[derive(Clone)]
pub struct ClipSet {
    /// Sequence the clips are bound to
    pub target: SequenceRef,
    /// Clips sorted by start time
    pub clips: Vec<Clip>,
}

/// Group a tick's declarations into one sorted clip set per sequence.
///
/// Sequences keep the order in which they were first declared. A clip
/// declared more than once keeps its first declaration. If two different
/// sequence objects claim the same id in one tick, the first one wins.
pub fn merge_declarations(
    declarations: impl IntoIterator<Item = ClipDeclaration>,
) -> IndexMap<SequenceId, ClipSet> {
    let mut sets: IndexMap<SequenceId, ClipSet> = IndexMap::new();

    for declaration in declarations {
        let set = match sets.entry(declaration.sequence.id()) {
            Entry::Occupied(entry) => {
                let set = entry.into_mut();
                if !Arc::ptr_eq(&set.target, &declaration.sequence) {
                    tracing::warn!(
                        sequence = %declaration.sequence.name(),
                        clip = %declaration.clip,
                        "Two sequence objects share one id in a single tick, ignoring the later one"
                    );
                    continue;
                }
                set
            }
            Entry::Vacant(entry) => entry.insert(ClipSet {
                target: Arc::clone(&declaration.sequence),
                clips: Vec::new(),
            }),
        };

        if set.clips.iter().any(|c| c.id == declaration.clip) {
            tracing::debug!(clip = %declaration.clip, "Duplicate clip declaration dropped");
            continue;
        }
        set.clips.push(declaration.to_clip());
    }

    for set in sets.values_mut() {
        // Stable, so equal starts keep declaration order.
        set.clips.sort_by(|a, b| a.start.total_cmp(&b.start));
    }

    sets
}

/// Clips of one sequence classified against a playhead time
#[derive(Debug, Default)]
pub struct ClipWindow<'a> {
    /// Clips whose end is at or before the playhead, in start order
    pub past: Vec<&'a Clip>,
    /// First clip containing the playhead
    pub current: Option<&'a Clip>,
    /// Further clips containing the playhead, which is an authoring error
    pub overlapping: Vec<&'a Clip>,
}

impl<'a> ClipWindow<'a> {
    /// Classify sorted `clips` at `time`; clips starting later are ignored
    pub fn classify(time: f64, clips: &'a [Clip]) -> Self {
        let mut window = Self::default();
        for clip in clips {
            if clip.is_past(time) {
                window.past.push(clip);
            } else if clip.contains(time) {
                if window.current.is_none() {
                    window.current = Some(clip);
                } else {
                    window.overlapping.push(clip);
                }
            }
        }
        window
    }

    /// Whether the playhead is before every clip
    pub fn is_before_start(&self) -> bool {
        self.past.is_empty() && self.current.is_none()
    }
}
