// SPDX-License-Identifier: MIT OR Apache-2.0
//! Minimal scene state standing in for the rendering host.

use indexmap::IndexMap;
use ordoplay_replay::Step;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Animated properties keyed by `element.property`
#[derive(Debug, Clone, Default)]
pub struct SceneState {
    properties: Arc<RwLock<IndexMap<String, f64>>>,
}

#[allow(dead_code)] // Intentionally kept for API completeness
impl SceneState {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property
    pub fn set(&self, key: &str, value: f64) {
        self.properties.write().insert(key.to_string(), value);
    }

    /// Get a property
    pub fn get(&self, key: &str) -> Option<f64> {
        self.properties.read().get(key).copied()
    }

    /// Remove every property of `element`
    pub fn remove_element(&self, element: &str) {
        let prefix = format!("{element}.");
        self.properties.write().retain(|k, _| !k.starts_with(&prefix));
    }

    /// Remove a single property
    pub fn remove(&self, key: &str) {
        self.properties.write().shift_remove(key);
    }

    /// Number of live properties
    pub fn len(&self) -> usize {
        self.properties.read().len()
    }
}

impl fmt::Display for SceneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let properties = self.properties.read();
        if properties.is_empty() {
            return write!(f, "(baseline)");
        }
        let mut first = true;
        for (key, value) in properties.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value:.2}")?;
            first = false;
        }
        Ok(())
    }
}

/// Linear tween of one scene property
pub struct Tween {
    scene: SceneState,
    key: String,
    from: f64,
    to: f64,
    duration: f64,
}

impl Tween {
    /// Tween `key` from `from` to `to` over `duration` seconds
    pub fn new(scene: &SceneState, key: &str, from: f64, to: f64, duration: f64) -> Self {
        Self {
            scene: scene.clone(),
            key: key.to_string(),
            from,
            to,
            duration,
        }
    }
}

impl Step for Tween {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn evaluate(&mut self, progress: f64) {
        let value = self.from + (self.to - self.from) * progress;
        self.scene.set(&self.key, value);
    }
}
