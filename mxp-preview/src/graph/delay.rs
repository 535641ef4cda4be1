//! Feedback delay stage

use crate::audio::AudioFrame;
use crate::graph::node::{AudioNode, NodeKind};
use crate::options::DelayConfig;

/// Feedback gain ceiling; keeps the loop from running away
pub const MAX_FEEDBACK: f32 = 0.95;

/// Longest delay line, in milliseconds
pub const MAX_DELAY_MS: f32 = 5000.0;

/// Delay line with a feedback loop, mixed over the dry signal.
///
/// Output is `x + d` where `d` is the line output; the line is fed
/// `x + d * feedback`, so each repeat is `feedback` quieter than the last.
pub struct DelayStage {
    line: Vec<AudioFrame>,
    position: usize,
    feedback: f32,
}

impl DelayStage {
    pub fn new(config: &DelayConfig, sample_rate: u32) -> Self {
        let frames = delay_frames(config.time, sample_rate);
        let feedback = if config.feedback.is_finite() {
            (config.feedback / 100.0).clamp(0.0, MAX_FEEDBACK)
        } else {
            0.0
        };

        Self {
            line: vec![AudioFrame::zero(); frames],
            position: 0,
            feedback,
        }
    }

    /// Delay length in frames
    pub fn delay_frames(&self) -> usize {
        self.line.len()
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }
}

/// Delay length in frames for a time in milliseconds, capped at
/// `MAX_DELAY_MS`; at least one frame
pub fn delay_frames(time_ms: f32, sample_rate: u32) -> usize {
    let time_ms = time_ms.max(0.0).min(MAX_DELAY_MS);
    let frames = (time_ms as f64 / 1000.0 * sample_rate as f64).round() as usize;
    frames.max(1)
}

impl AudioNode for DelayStage {
    fn kind(&self) -> NodeKind {
        NodeKind::Delay
    }

    fn process(&mut self, input: AudioFrame) -> AudioFrame {
        let delayed = self.line[self.position];
        self.line[self.position] = AudioFrame::from_stereo(
            input.left + delayed.left * self.feedback,
            input.right + delayed.right * self.feedback,
        );
        self.position = (self.position + 1) % self.line.len();

        AudioFrame::from_stereo(input.left + delayed.left, input.right + delayed.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(time: f32, feedback: f32) -> DelayConfig {
        DelayConfig {
            enabled: true,
            time,
            feedback,
        }
    }

    #[test]
    fn test_delay_length_and_feedback_mapping() {
        let stage = DelayStage::new(&config(250.0, 40.0), 44100);
        assert_eq!(stage.delay_frames(), 11025);
        assert!((stage.feedback() - 0.4).abs() < 1e-6);

        assert_eq!(DelayStage::new(&config(0.0, 100.0), 44100).delay_frames(), 1);
        assert_eq!(DelayStage::new(&config(10.0, 100.0), 44100).feedback(), MAX_FEEDBACK);
        assert_eq!(DelayStage::new(&config(10.0, -20.0), 44100).feedback(), 0.0);
    }

    #[test]
    fn test_delay_length_is_capped() {
        assert_eq!(delay_frames(MAX_DELAY_MS, 44100), 220500);
        assert_eq!(delay_frames(1e9, 44100), 220500);
        assert_eq!(delay_frames(f32::MAX, 44100), 220500);
        assert_eq!(delay_frames(f32::INFINITY, 44100), 220500);
        assert_eq!(delay_frames(f32::NAN, 44100), 1);

        let stage = DelayStage::new(&config(f32::MAX, 40.0), 1000);
        assert_eq!(stage.delay_frames(), 5000);
    }

    #[test]
    fn test_impulse_repeats_with_feedback_decay() {
        // 1 kHz rate: 4 ms = 4 frames
        let mut stage = DelayStage::new(&config(4.0, 50.0), 1000);
        let mut out = Vec::new();
        out.push(stage.process(AudioFrame::from_mono(1.0)).left);
        for _ in 0..12 {
            out.push(stage.process(AudioFrame::zero()).left);
        }

        assert_eq!(out[0], 1.0);
        assert_eq!(out[4], 1.0);
        assert_eq!(out[8], 0.5);
        assert_eq!(out[12], 0.25);
        assert_eq!(out[5], 0.0);
    }
}
