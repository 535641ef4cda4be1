//! Convolution reverb
//!
//! The impulse response is synthesized rather than loaded: stereo white noise
//! shaped by a `(1 - t)^decay` envelope, `round(decay * sample_rate)` frames long.
//!
//! Convolution uses uniformly partitioned overlap-save in the frequency domain.
//! The impulse response is cut into partitions of `block_size` frames, each
//! transformed once; every input block is transformed once and multiplied
//! against all partitions through a frequency-domain delay line. The wet
//! signal lags the dry signal by one block.

use crate::audio::AudioFrame;
use crate::graph::node::{AudioNode, NodeKind};
use crate::options::ReverbConfig;
use num_complex::Complex;
use rand::Rng;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Partition size in frames
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Longest impulse response synthesized, in seconds
pub const MAX_REVERB_DECAY_SECS: f32 = 10.0;

// Convolver loudness normalization constants
const GAIN_CALIBRATION: f32 = 0.00125;
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;
const MIN_POWER: f32 = 0.000125;

/// Stereo impulse response
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl ImpulseResponse {
    /// Frames per channel
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn channels(&self) -> usize {
        2
    }

    /// Gain that brings convolution output to a consistent loudness
    /// regardless of impulse response length or energy.
    pub fn normalization_scale(&self, sample_rate: u32) -> f32 {
        if self.is_empty() || sample_rate == 0 {
            return 1.0;
        }

        let energy: f32 = self
            .left
            .iter()
            .chain(self.right.iter())
            .map(|s| s * s)
            .sum();
        let mut power = (energy / (2 * self.len()) as f32).sqrt();
        if !power.is_finite() || power < MIN_POWER {
            power = MIN_POWER;
        }

        GAIN_CALIBRATION / power * (GAIN_CALIBRATION_SAMPLE_RATE / sample_rate as f32)
    }

    fn scale(&mut self, gain: f32) {
        for sample in self.left.iter_mut().chain(self.right.iter_mut()) {
            *sample *= gain;
        }
    }
}

/// Decay time limited to `0..=MAX_REVERB_DECAY_SECS`; NaN becomes zero
pub fn clamp_decay(decay_secs: f32) -> f32 {
    decay_secs.max(0.0).min(MAX_REVERB_DECAY_SECS)
}

/// Impulse response length in frames for a decay time in seconds
pub fn impulse_length(decay_secs: f32, sample_rate: u32) -> usize {
    (clamp_decay(decay_secs) as f64 * sample_rate as f64).round() as usize
}

/// Synthesize a stereo exponential-decay noise impulse response.
///
/// Each channel is independent white noise in [-1, 1) multiplied by
/// `(1 - i / len)^decay`.
pub fn generate_impulse_response<R: Rng + ?Sized>(
    decay_secs: f32,
    sample_rate: u32,
    rng: &mut R,
) -> ImpulseResponse {
    let length = impulse_length(decay_secs, sample_rate);
    let decay = clamp_decay(decay_secs);

    let mut left = Vec::with_capacity(length);
    let mut right = Vec::with_capacity(length);
    for i in 0..length {
        let envelope = (1.0 - i as f32 / length as f32).powf(decay);
        left.push(rng.gen_range(-1.0f32..1.0) * envelope);
        right.push(rng.gen_range(-1.0f32..1.0) * envelope);
    }

    ImpulseResponse { left, right }
}

/// One channel of the partitioned convolver
struct ChannelConvolver {
    /// Spectra of the impulse response partitions
    partitions: Vec<Vec<Complex<f32>>>,
    /// Spectra of recent input blocks, newest at `head`
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    /// Previous block followed by the block being filled
    input: Vec<f32>,
    /// Wet output for the block being filled
    output: Vec<f32>,
    work: Vec<Complex<f32>>,
    accum: Vec<Complex<f32>>,
}

impl ChannelConvolver {
    fn new(impulse: &[f32], block_size: usize, fft: &Arc<dyn Fft<f32>>) -> Self {
        let fft_size = block_size * 2;
        let zero = Complex::new(0.0, 0.0);

        let partitions: Vec<Vec<Complex<f32>>> = impulse
            .chunks(block_size)
            .map(|chunk| {
                let mut spectrum = vec![zero; fft_size];
                for (bin, &sample) in spectrum.iter_mut().zip(chunk) {
                    *bin = Complex::new(sample, 0.0);
                }
                fft.process(&mut spectrum);
                spectrum
            })
            .collect();

        let history = vec![vec![zero; fft_size]; partitions.len()];

        Self {
            partitions,
            history,
            head: 0,
            input: vec![0.0; fft_size],
            output: vec![0.0; block_size],
            work: vec![zero; fft_size],
            accum: vec![zero; fft_size],
        }
    }

    fn process_block(
        &mut self,
        fft: &Arc<dyn Fft<f32>>,
        ifft: &Arc<dyn Fft<f32>>,
        scratch: &mut [Complex<f32>],
    ) {
        let block_size = self.output.len();
        let count = self.partitions.len();

        if count > 0 {
            for (bin, &sample) in self.work.iter_mut().zip(&self.input) {
                *bin = Complex::new(sample, 0.0);
            }
            fft.process_with_scratch(&mut self.work, scratch);

            self.head = (self.head + count - 1) % count;
            self.history[self.head].copy_from_slice(&self.work);

            self.accum.fill(Complex::new(0.0, 0.0));
            for (p, partition) in self.partitions.iter().enumerate() {
                let spectrum = &self.history[(self.head + p) % count];
                for ((acc, x), h) in self.accum.iter_mut().zip(spectrum).zip(partition) {
                    *acc += x * h;
                }
            }
            ifft.process_with_scratch(&mut self.accum, scratch);

            // rustfft leaves the inverse transform unscaled
            let scale = 1.0 / self.accum.len() as f32;
            for (out, bin) in self.output.iter_mut().zip(&self.accum[block_size..]) {
                *out = bin.re * scale;
            }
        }

        self.input.copy_within(block_size.., 0);
    }
}

/// Stereo FFT convolver producing only the wet signal
pub struct ConvolverNode {
    block_size: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    left: ChannelConvolver,
    right: ChannelConvolver,
    scratch: Vec<Complex<f32>>,
    position: usize,
}

impl ConvolverNode {
    /// Build a convolver for `impulse` with `block_size`-frame partitions.
    ///
    /// The impulse response is used as given, without normalization.
    pub fn new(impulse: &ImpulseResponse, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(block_size * 2);
        let ifft = planner.plan_fft_inverse(block_size * 2);

        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());

        Self {
            block_size,
            left: ChannelConvolver::new(&impulse.left, block_size, &fft),
            right: ChannelConvolver::new(&impulse.right, block_size, &fft),
            fft,
            ifft,
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            position: 0,
        }
    }

    pub fn partition_count(&self) -> usize {
        self.left.partitions.len()
    }

    /// Convolve one frame; the result is delayed by one block
    pub fn convolve(&mut self, input: AudioFrame) -> AudioFrame {
        let pos = self.position;
        let output = AudioFrame::from_stereo(self.left.output[pos], self.right.output[pos]);

        self.left.input[self.block_size + pos] = input.left;
        self.right.input[self.block_size + pos] = input.right;

        self.position += 1;
        if self.position == self.block_size {
            self.left
                .process_block(&self.fft, &self.ifft, &mut self.scratch);
            self.right
                .process_block(&self.fft, &self.ifft, &mut self.scratch);
            self.position = 0;
        }

        output
    }
}

/// Reverb effect stage: dry signal mixed with the convolved wet signal
pub struct ReverbStage {
    convolver: ConvolverNode,
    impulse_len: usize,
    wet: f32,
    dry: f32,
}

impl ReverbStage {
    /// Build from config, synthesizing a fresh impulse response
    pub fn new(config: &ReverbConfig, sample_rate: u32) -> Self {
        Self::with_rng(config, sample_rate, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(config: &ReverbConfig, sample_rate: u32, rng: &mut R) -> Self {
        let impulse = generate_impulse_response(config.decay, sample_rate, rng);
        Self::with_impulse(impulse, config.amount, sample_rate)
    }

    /// Build around an existing impulse response; `amount` is the wet level 0-100
    pub fn with_impulse(mut impulse: ImpulseResponse, amount: f32, sample_rate: u32) -> Self {
        let scale = impulse.normalization_scale(sample_rate);
        impulse.scale(scale);

        let mix = if amount.is_finite() {
            (amount / 100.0).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            convolver: ConvolverNode::new(&impulse, DEFAULT_BLOCK_SIZE),
            impulse_len: impulse.len(),
            wet: mix,
            dry: 1.0 - mix,
        }
    }

    /// Frames in the impulse response
    pub fn impulse_len(&self) -> usize {
        self.impulse_len
    }

    pub fn wet_level(&self) -> f32 {
        self.wet
    }
}

impl AudioNode for ReverbStage {
    fn kind(&self) -> NodeKind {
        NodeKind::Reverb
    }

    fn process(&mut self, input: AudioFrame) -> AudioFrame {
        let wet = self.convolver.convolve(input);
        AudioFrame::from_stereo(
            input.left * self.dry + wet.left * self.wet,
            input.right * self.dry + wet.right * self.wet,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_impulse_length_is_decay_times_rate() {
        let ir = generate_impulse_response(2.0, 44100, &mut rng());
        assert_eq!(ir.len(), 88200);
        assert_eq!(ir.right.len(), 88200);
        assert_eq!(ir.channels(), 2);

        assert_eq!(impulse_length(1.5, 48000), 72000);
        assert_eq!(impulse_length(0.00001, 44100), 0);
        assert_eq!(impulse_length(-1.0, 44100), 0);
        assert_eq!(impulse_length(f32::NAN, 44100), 0);
    }

    #[test]
    fn test_impulse_length_is_capped() {
        assert_eq!(impulse_length(MAX_REVERB_DECAY_SECS, 44100), 441000);
        assert_eq!(impulse_length(1e5, 44100), 441000);
        assert_eq!(impulse_length(f32::MAX, 44100), 441000);
        assert_eq!(impulse_length(f32::INFINITY, 44100), 441000);

        let ir = generate_impulse_response(f32::MAX, 100, &mut rng());
        assert_eq!(ir.len(), 1000);
        assert!(ir.left.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_impulse_decays() {
        let ir = generate_impulse_response(3.0, 8000, &mut rng());
        let quarter = ir.len() / 4;
        let energy = |s: &[f32]| s.iter().map(|x| x * x).sum::<f32>();

        let head = energy(&ir.left[..quarter]);
        let tail = energy(&ir.left[ir.len() - quarter..]);
        assert!(head > tail * 10.0, "head={} tail={}", head, tail);
        assert!(ir.left.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert_ne!(ir.left, ir.right);
    }

    #[test]
    fn test_convolver_with_unit_impulse_delays_by_one_block() {
        let impulse = ImpulseResponse {
            left: vec![1.0],
            right: vec![0.5],
        };
        let mut convolver = ConvolverNode::new(&impulse, 8);
        let input: Vec<f32> = (0..32).map(|i| (i as f32 * 0.37).sin()).collect();

        let output: Vec<AudioFrame> = input
            .iter()
            .map(|&x| convolver.convolve(AudioFrame::from_mono(x)))
            .collect();

        for i in 0..8 {
            assert!(output[i].left.abs() < 1e-6);
        }
        for i in 8..32 {
            assert!((output[i].left - input[i - 8]).abs() < 1e-4);
            assert!((output[i].right - input[i - 8] * 0.5).abs() < 1e-4);
        }
    }

    #[test]
    fn test_convolver_matches_direct_convolution_across_partitions() {
        let mut r = rng();
        let impulse = generate_impulse_response(0.01, 2000, &mut r);
        assert_eq!(impulse.len(), 20);

        let block = 4;
        let mut convolver = ConvolverNode::new(&impulse, block);
        assert_eq!(convolver.partition_count(), 5);

        let input: Vec<f32> = (0..64).map(|_| r.gen_range(-1.0f32..1.0)).collect();
        let output: Vec<f32> = input
            .iter()
            .map(|&x| convolver.convolve(AudioFrame::from_mono(x)).left)
            .collect();

        for n in block..input.len() {
            let t = n - block;
            let expected: f32 = (0..impulse.len())
                .filter(|&k| k <= t)
                .map(|k| impulse.left[k] * input[t - k])
                .sum();
            assert!(
                (output[n] - expected).abs() < 1e-3,
                "frame {}: got {} expected {}",
                n,
                output[n],
                expected
            );
        }
    }

    #[test]
    fn test_reverb_stage_mix() {
        let config = ReverbConfig {
            enabled: true,
            amount: 0.0,
            decay: 0.5,
        };
        let mut dry_only = ReverbStage::with_rng(&config, 8000, &mut rng());
        assert_eq!(dry_only.impulse_len(), 4000);
        assert_eq!(dry_only.kind(), NodeKind::Reverb);

        let frame = AudioFrame::from_stereo(0.25, -0.25);
        for _ in 0..2000 {
            assert_eq!(dry_only.process(frame), frame);
        }

        let full = ReverbStage::with_rng(
            &ReverbConfig {
                amount: 250.0,
                ..config
            },
            8000,
            &mut rng(),
        );
        assert_eq!(full.wet_level(), 1.0);
    }

    #[test]
    fn test_empty_impulse_produces_silent_wet_signal() {
        let mut convolver = ConvolverNode::new(
            &ImpulseResponse {
                left: Vec::new(),
                right: Vec::new(),
            },
            4,
        );
        for _ in 0..16 {
            assert_eq!(convolver.convolve(AudioFrame::from_mono(1.0)), AudioFrame::zero());
        }
    }
}
