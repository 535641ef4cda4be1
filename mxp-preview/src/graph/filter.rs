//! Low-pass filter stage (RBJ biquad, transposed direct form II)

use crate::audio::AudioFrame;
use crate::graph::node::{AudioNode, NodeKind};
use crate::options::FilterConfig;
use std::f32::consts::PI;

const MIN_FREQUENCY: f32 = 10.0;
const MIN_Q: f32 = 0.0001;

#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    z1: f32,
    z2: f32,
}

/// Normalized biquad coefficients (a0 = 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoefficients {
    /// Low-pass at `frequency` Hz with quality factor `q`.
    ///
    /// Frequency is clamped to [10 Hz, 0.49 * sample_rate].
    pub fn lowpass(frequency: f32, q: f32, sample_rate: u32) -> Self {
        let sr = sample_rate.max(1) as f32;
        let frequency = if frequency.is_finite() {
            frequency.clamp(MIN_FREQUENCY.min(sr * 0.49), sr * 0.49)
        } else {
            sr * 0.49
        };
        let q = if q.is_finite() { q.max(MIN_Q) } else { MIN_Q };

        let w0 = 2.0 * PI * frequency / sr;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn run(&self, state: &mut BiquadState, x: f32) -> f32 {
        let y = self.b0 * x + state.z1;
        state.z1 = self.b1 * x - self.a1 * y + state.z2;
        state.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

pub struct FilterStage {
    coefficients: BiquadCoefficients,
    left: BiquadState,
    right: BiquadState,
}

impl FilterStage {
    pub fn new(config: &FilterConfig, sample_rate: u32) -> Self {
        Self {
            coefficients: BiquadCoefficients::lowpass(
                config.frequency,
                config.resonance,
                sample_rate,
            ),
            left: BiquadState::default(),
            right: BiquadState::default(),
        }
    }

    pub fn coefficients(&self) -> BiquadCoefficients {
        self.coefficients
    }
}

impl AudioNode for FilterStage {
    fn kind(&self) -> NodeKind {
        NodeKind::Filter
    }

    fn process(&mut self, input: AudioFrame) -> AudioFrame {
        AudioFrame::from_stereo(
            self.coefficients.run(&mut self.left, input.left),
            self.coefficients.run(&mut self.right, input.right),
        )
    }
}
