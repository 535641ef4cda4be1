//! Core audio data types
//!
//! Defines the stereo frame passed between graph nodes and the decoded preview
//! buffer that sources play from.

/// One stereo frame, the unit every graph node processes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioFrame {
    /// Left channel sample
    pub left: f32,

    /// Right channel sample
    pub right: f32,
}

impl AudioFrame {
    /// Silence
    pub fn zero() -> Self {
        AudioFrame { left: 0.0, right: 0.0 }
    }

    /// Same sample on both sides
    pub fn from_mono(sample: f32) -> Self {
        AudioFrame {
            left: sample,
            right: sample,
        }
    }

    pub fn from_stereo(left: f32, right: f32) -> Self {
        AudioFrame { left, right }
    }

    /// Copy of this frame scaled by `gain`
    pub fn scaled(self, gain: f32) -> Self {
        AudioFrame {
            left: self.left * gain,
            right: self.right * gain,
        }
    }

    /// Mono downmix
    pub fn mono(&self) -> f32 {
        (self.left + self.right) * 0.5
    }

    /// Limit both sides to [-1.0, 1.0] before they reach a device or file
    pub fn clamp(&mut self) {
        self.left = self.left.clamp(-1.0, 1.0);
        self.right = self.right.clamp(-1.0, 1.0);
    }
}

/// Decoded preview audio, ready for playback.
///
/// Interleaved stereo f32 at the sample rate of the audio context it was
/// decoded for.
///
/// Immutable once constructed; shared between the cache and playback sessions.
#[derive(Debug, Clone)]
pub struct DecodedAudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    source_channels: u16,
    frame_count: usize,
}

impl DecodedAudioBuffer {
    /// Wrap interleaved stereo samples.
    ///
    /// `source_channels` records the channel count of the encoded audio (mono
    /// sources are duplicated to stereo before reaching this point).
    pub fn new(samples: Vec<f32>, sample_rate: u32, source_channels: u16) -> Self {
        let frame_count = samples.len() / 2;
        Self {
            samples,
            sample_rate,
            source_channels,
            frame_count,
        }
    }

    /// Stereo frame at `frame_index`
    pub fn frame(&self, frame_index: usize) -> Option<AudioFrame> {
        let sample_index = frame_index * 2;
        if sample_index + 1 < self.samples.len() {
            Some(AudioFrame {
                left: self.samples[sample_index],
                right: self.samples[sample_index + 1],
            })
        } else {
            None
        }
    }

    /// Number of stereo frames
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the encoded source
    pub fn channels(&self) -> u16 {
        self.source_channels
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Interleaved stereo samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Frame index nearest to `seconds`, clamped to the buffer length
    pub fn frame_at(&self, seconds: f64) -> usize {
        let frame = (seconds.max(0.0) * self.sample_rate as f64).round() as usize;
        frame.min(self.frame_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_access() {
        let buffer = DecodedAudioBuffer::new(vec![0.1, 0.2, 0.3, 0.4], 44100, 2);
        assert_eq!(buffer.frame_count(), 2);
        assert_eq!(buffer.frame(1), Some(AudioFrame::from_stereo(0.3, 0.4)));
        assert_eq!(buffer.frame(2), None);
    }

    #[test]
    fn test_duration_and_frame_at() {
        let buffer = DecodedAudioBuffer::new(vec![0.0; 44100 * 2], 44100, 1);
        assert!((buffer.duration_secs() - 1.0).abs() < 1e-9);
        assert_eq!(buffer.frame_at(0.5), 22050);
        assert_eq!(buffer.frame_at(-1.0), 0);
        assert_eq!(buffer.frame_at(10.0), 44100);
        assert_eq!(buffer.channels(), 1);
    }

    #[test]
    fn test_frame_scaling_and_mono() {
        let frame = AudioFrame::from_stereo(0.5, -0.25);
        assert_eq!(frame.scaled(2.0), AudioFrame::from_stereo(1.0, -0.5));
        assert_eq!(AudioFrame::from_stereo(1.0, 0.0).mono(), 0.5);

        let mut loud = AudioFrame::from_mono(3.0);
        loud.clamp();
        assert_eq!(loud, AudioFrame::from_mono(1.0));
    }
}
