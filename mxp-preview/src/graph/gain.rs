//! Gain node with a level shared outside the audio thread

use crate::audio::AudioFrame;
use crate::graph::node::{AudioNode, NodeKind};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Shared, clamped gain level stored as f32 bits
#[derive(Debug, Clone)]
pub struct GainHandle(Arc<AtomicU32>);

impl GainHandle {
    pub fn new(level: f32) -> Self {
        Self(Arc::new(AtomicU32::new(Self::clamp(level).to_bits())))
    }

    /// Set the level, clamped to [0.0, 1.0]; returns the applied level
    pub fn set(&self, level: f32) -> f32 {
        let clamped = Self::clamp(level);
        self.0.store(clamped.to_bits(), Ordering::Relaxed);
        clamped
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn clamp(level: f32) -> f32 {
        if level.is_nan() {
            0.0
        } else {
            level.clamp(0.0, 1.0)
        }
    }
}

impl Default for GainHandle {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Final node of every preview graph
pub struct GainNode {
    level: GainHandle,
}

impl GainNode {
    /// A fresh gain node at unity
    pub fn new() -> Self {
        Self {
            level: GainHandle::default(),
        }
    }

    pub fn with_level(level: f32) -> Self {
        Self {
            level: GainHandle::new(level),
        }
    }

    pub fn handle(&self) -> GainHandle {
        self.level.clone()
    }
}

impl Default for GainNode {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioNode for GainNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Gain
    }

    fn process(&mut self, input: AudioFrame) -> AudioFrame {
        input.scaled(self.level.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_clamping() {
        let handle = GainHandle::default();
        assert_eq!(handle.get(), 1.0);
        assert_eq!(handle.set(-1.0), 0.0);
        assert_eq!(handle.set(5.0), 1.0);
        assert_eq!(handle.set(0.3), 0.3);
        assert_eq!(handle.set(f32::NAN), 0.0);
    }

    #[test]
    fn test_handle_controls_node() {
        let mut node = GainNode::new();
        let handle = node.handle();
        handle.set(0.5);
        assert_eq!(
            node.process(AudioFrame::from_stereo(1.0, -1.0)),
            AudioFrame::from_stereo(0.5, -0.5)
        );
    }
}
