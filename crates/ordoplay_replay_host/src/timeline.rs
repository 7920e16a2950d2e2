// SPDX-License-Identifier: MIT OR Apache-2.0
//! Demo timeline: tracks of clips bound to authored sequences.

use crate::authored::{TitleCard, Typewriter};
use crate::scene::SceneState;
use ordoplay_replay::{ClipDeclaration, ClipId, Orchestrator, SequenceRef};
use std::sync::Arc;

/// A clip placed on a track
struct PlacedClip {
    id: ClipId,
    start: f64,
    duration: f64,
}

/// A row of clips all driving one sequence
struct Track {
    name: &'static str,
    target: SequenceRef,
    clips: Vec<PlacedClip>,
}

/// Tracks plus the scene they animate
pub struct Timeline {
    scene: SceneState,
    tracks: Vec<Track>,
}

impl Timeline {
    /// Build the demo timeline, sizing clips from probed step durations
    pub async fn build(orchestrator: &Orchestrator) -> ordoplay_replay::Result<Self> {
        let scene = SceneState::new();
        let title: SequenceRef = Arc::new(TitleCard::new(&scene));
        let caption: SequenceRef = Arc::new(Typewriter::new(&scene, "OrdoPlay"));

        let title_clips = lay_out(0.0, &orchestrator.probe(&title).await?);
        let caption_steps = orchestrator.probe(&caption).await?;
        let mut caption_clips = lay_out(1.0, &caption_steps);
        // The second half of the caption lives on its own track.
        let second_half = caption_clips.split_off(caption_clips.len() / 2);

        let tracks = vec![
            Track {
                name: "title",
                target: Arc::clone(&title),
                clips: title_clips,
            },
            Track {
                name: "caption_a",
                target: Arc::clone(&caption),
                clips: caption_clips,
            },
            Track {
                name: "caption_b",
                target: caption,
                clips: second_half,
            },
        ];

        for track in &tracks {
            tracing::info!(track = track.name, clips = track.clips.len(), "Track laid out");
        }

        Ok(Self { scene, tracks })
    }

    /// Scene driven by this timeline
    pub fn scene(&self) -> &SceneState {
        &self.scene
    }

    /// Every clip of every track, as one tick's declarations
    pub fn declarations(&self) -> Vec<ClipDeclaration> {
        self.tracks
            .iter()
            .flat_map(|track| {
                track.clips.iter().map(|clip| {
                    ClipDeclaration::new(Arc::clone(&track.target), clip.id, clip.start, clip.duration)
                })
            })
            .collect()
    }

    /// End of the last clip
    pub fn duration(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| t.clips.iter())
            .map(|c| c.start + c.duration)
            .fold(0.0, f64::max)
    }
}

/// Place one clip per step back to back from `start`
fn lay_out(start: f64, durations: &[f64]) -> Vec<PlacedClip> {
    let mut cursor = start;
    durations
        .iter()
        .map(|&duration| {
            let clip = PlacedClip {
                id: ClipId::new(),
                start: cursor,
                duration,
            };
            cursor += duration;
            clip
        })
        .collect()
}
