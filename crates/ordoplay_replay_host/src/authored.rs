// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequences authored for the demo timeline.

use crate::scene::{SceneState, Tween};
use ordoplay_replay::{
    ChannelGenerator, IterGenerator, Sequence, SequenceId, Step, StepGenerator,
};

/// Title that fades in and then slides up
pub struct TitleCard {
    id: SequenceId,
    scene: SceneState,
}

impl TitleCard {
    /// Create a title card animating `scene`
    pub fn new(scene: &SceneState) -> Self {
        Self {
            id: SequenceId::new(),
            scene: scene.clone(),
        }
    }
}

impl Sequence for TitleCard {
    fn id(&self) -> SequenceId {
        self.id
    }

    fn name(&self) -> &str {
        "title_card"
    }

    fn prepare(&self) {
        self.scene.set("title.opacity", 0.0);
        self.scene.set("title.y", 0.0);
    }

    fn define(&self) -> Box<dyn StepGenerator> {
        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(Tween::new(&self.scene, "title.opacity", 0.0, 1.0, 1.0)),
            Box::new(Tween::new(&self.scene, "title.y", 0.0, 40.0, 1.5)),
        ];
        Box::new(IterGenerator::new(steps))
    }

    fn cleanup(&self) {
        self.scene.remove_element("title");
    }
}

/// Reveals one character of a caption, showing a cursor while active
struct Reveal {
    scene: SceneState,
    chars: usize,
}

impl Step for Reveal {
    fn duration(&self) -> f64 {
        0.5
    }

    fn evaluate(&mut self, progress: f64) {
        self.scene.set("caption.cursor", 1.0);
        let shown = (self.chars - 1) as f64 + progress;
        self.scene.set("caption.chars", shown);
    }

    fn dispose(&mut self) {
        self.scene.remove("caption.cursor");
    }
}

/// Caption typed out one character at a time.
///
/// Glyphs are "rasterized" on a worker task before each step is yielded.
pub struct Typewriter {
    id: SequenceId,
    scene: SceneState,
    text: String,
}

impl Typewriter {
    /// Create a typewriter for `text`
    pub fn new(scene: &SceneState, text: &str) -> Self {
        Self {
            id: SequenceId::new(),
            scene: scene.clone(),
            text: text.to_string(),
        }
    }
}

impl Sequence for Typewriter {
    fn id(&self) -> SequenceId {
        self.id
    }

    fn name(&self) -> &str {
        "typewriter"
    }

    fn prepare(&self) {
        self.scene.set("caption.chars", 0.0);
    }

    fn define(&self) -> Box<dyn StepGenerator> {
        let scene = self.scene.clone();
        let glyphs = self.text.chars().count();
        Box::new(ChannelGenerator::spawn(move |sender| async move {
            for chars in 1..=glyphs {
                tokio::task::yield_now().await;
                sender
                    .yield_step(Box::new(Reveal {
                        scene: scene.clone(),
                        chars,
                    }))
                    .await?;
            }
            Ok(())
        }))
    }

    fn cleanup(&self) {
        self.scene.remove_element("caption");
    }
}
