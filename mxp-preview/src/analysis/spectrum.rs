//! Spectrum and stereo waveform analysis
//!
//! Keeps a sliding window of the most recent frames. The spectrum is the
//! Hann-windowed FFT magnitude of the mono downmix (positive frequencies only,
//! scaled by 1/sqrt(N)); the stereo data is the latest left/right waveform.

use crate::audio::AudioFrame;
use mxp_common::events::{AnalysisFrame, StereoData};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

pub struct SpectrumAnalyzer {
    fft_size: usize,
    waveform_len: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: VecDeque<AudioFrame>,
    fft_buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    /// `fft_size` is rounded up to a power of two (minimum 32)
    pub fn new(fft_size: usize, waveform_len: usize) -> Self {
        let fft_size = fft_size.max(32).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Pre-compute Hann window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let t = i as f32 / (fft_size - 1) as f32;
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
            })
            .collect();

        let scratch_len = fft.get_inplace_scratch_len();
        let capacity = fft_size.max(waveform_len);

        Self {
            fft_size,
            waveform_len,
            fft,
            window,
            history: VecDeque::with_capacity(capacity),
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins produced by `spectrum`
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Append frames, keeping only the most recent window
    pub fn push_frames(&mut self, frames: &[AudioFrame]) {
        let capacity = self.fft_size.max(self.waveform_len);
        let skip = frames.len().saturating_sub(capacity);
        for frame in &frames[skip..] {
            if self.history.len() == capacity {
                self.history.pop_front();
            }
            // Non-finite input would poison every bin
            let left = if frame.left.is_finite() { frame.left } else { 0.0 };
            let right = if frame.right.is_finite() { frame.right } else { 0.0 };
            self.history.push_back(AudioFrame::from_stereo(left, right));
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Magnitude spectrum of the latest `fft_size` frames (zero-padded at the start)
    pub fn spectrum(&mut self) -> Vec<f32> {
        let available = self.history.len().min(self.fft_size);
        let pad = self.fft_size - available;
        let start = self.history.len() - available;

        for (i, bin) in self.fft_buffer.iter_mut().enumerate() {
            let sample = if i < pad {
                0.0
            } else {
                self.history[start + i - pad].mono()
            };
            *bin = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch);

        let norm_factor = 1.0 / (self.fft_size as f32).sqrt();
        self.fft_buffer[..self.bin_count()]
            .iter()
            .map(|bin| bin.norm() * norm_factor)
            .collect()
    }

    /// Latest `waveform_len` frames split into left and right
    pub fn stereo(&self) -> StereoData {
        let available = self.history.len().min(self.waveform_len);
        let start = self.history.len() - available;
        let (left, right) = self
            .history
            .range(start..)
            .map(|frame| (frame.left, frame.right))
            .unzip();
        StereoData { left, right }
    }

    pub fn analyze(&mut self, instrument: &str) -> AnalysisFrame {
        AnalysisFrame {
            instrument: instrument.to_string(),
            spectrum: self.spectrum(),
            stereo: self.stereo(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, sample_rate: f32, frames: usize) -> Vec<AudioFrame> {
        (0..frames)
            .map(|i| {
                let x = (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate).sin();
                AudioFrame::from_mono(x)
            })
            .collect()
    }

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        let mut analyzer = SpectrumAnalyzer::new(1024, 256);
        // 1024-point FFT at 44.1kHz: bin width ~43Hz; 4306.6Hz lands on bin 100
        analyzer.push_frames(&sine(4306.64, 44100.0, 4096));

        let spectrum = analyzer.spectrum();
        assert_eq!(spectrum.len(), 512);
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert!((99..=101).contains(&peak), "peak bin {}", peak);
    }

    #[test]
    fn test_silence_has_flat_zero_spectrum() {
        let mut analyzer = SpectrumAnalyzer::new(256, 64);
        analyzer.push_frames(&vec![AudioFrame::zero(); 300]);
        assert!(analyzer.spectrum().iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_stereo_keeps_latest_waveform() {
        let mut analyzer = SpectrumAnalyzer::new(32, 4);
        let frames: Vec<AudioFrame> = (0..10)
            .map(|i| AudioFrame::from_stereo(i as f32, -(i as f32)))
            .collect();
        analyzer.push_frames(&frames);

        let stereo = analyzer.stereo();
        assert_eq!(stereo.left, vec![6.0, 7.0, 8.0, 9.0]);
        assert_eq!(stereo.right, vec![-6.0, -7.0, -8.0, -9.0]);
    }

    #[test]
    fn test_partial_history_and_bad_samples() {
        let mut analyzer = SpectrumAnalyzer::new(100, 8);
        assert_eq!(analyzer.fft_size(), 128);

        analyzer.push_frames(&[AudioFrame::from_mono(f32::NAN), AudioFrame::from_mono(0.5)]);
        let frame = analyzer.analyze("master");
        assert_eq!(frame.instrument, "master");
        assert_eq!(frame.spectrum.len(), 64);
        assert!(frame.spectrum.iter().all(|m| m.is_finite()));
        assert_eq!(frame.stereo.left, vec![0.0, 0.5]);
    }
}
