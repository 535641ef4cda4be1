//! Single-use buffer source
//!
//! A source plays one decoded buffer forward from a start offset. It cannot be
//! repositioned or restarted; seeking builds a new source.

use crate::audio::{AudioFrame, DecodedAudioBuffer};
use std::sync::Arc;

/// Result of stopping a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// The source had already been stopped or had played to the end
    AlreadyStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Playing,
    Finished,
    Stopped,
}

/// Buffer player started at construction
pub struct BufferSource {
    buffer: Arc<DecodedAudioBuffer>,
    start_frame: usize,
    cursor: usize,
    state: SourceState,
}

impl BufferSource {
    /// Start playing `buffer` from `offset_secs` (clamped to the buffer)
    pub fn start(buffer: Arc<DecodedAudioBuffer>, offset_secs: f64) -> Self {
        let start_frame = buffer.frame_at(offset_secs);
        let state = if start_frame >= buffer.frame_count() {
            SourceState::Finished
        } else {
            SourceState::Playing
        };

        Self {
            buffer,
            start_frame,
            cursor: start_frame,
            state,
        }
    }

    /// Next frame, or `None` once the source has ended or been stopped
    pub fn next_frame(&mut self) -> Option<AudioFrame> {
        if self.state != SourceState::Playing {
            return None;
        }

        match self.buffer.frame(self.cursor) {
            Some(frame) => {
                self.cursor += 1;
                Some(frame)
            }
            None => {
                self.state = SourceState::Finished;
                None
            }
        }
    }

    pub fn stop(&mut self) -> StopOutcome {
        if self.is_finished() {
            self.state = SourceState::Finished;
        }

        match self.state {
            SourceState::Playing => {
                self.state = SourceState::Stopped;
                StopOutcome::Stopped
            }
            SourceState::Finished | SourceState::Stopped => StopOutcome::AlreadyStopped,
        }
    }

    /// True once every frame has been played
    pub fn is_finished(&self) -> bool {
        self.state == SourceState::Finished
            || (self.state == SourceState::Playing && self.cursor >= self.buffer.frame_count())
    }

    pub fn is_playing(&self) -> bool {
        self.state == SourceState::Playing && !self.is_finished()
    }

    /// Playback position in seconds within the buffer
    pub fn position_secs(&self) -> f64 {
        let rate = self.buffer.sample_rate();
        if rate == 0 {
            return 0.0;
        }
        self.cursor as f64 / rate as f64
    }

    /// Offset playback started from, in seconds
    pub fn start_offset_secs(&self) -> f64 {
        let rate = self.buffer.sample_rate();
        if rate == 0 {
            return 0.0;
        }
        self.start_frame as f64 / rate as f64
    }

    pub fn buffer(&self) -> &Arc<DecodedAudioBuffer> {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(frames: usize) -> Arc<DecodedAudioBuffer> {
        let samples = (0..frames)
            .flat_map(|i| [i as f32, -(i as f32)])
            .collect();
        Arc::new(DecodedAudioBuffer::new(samples, 10, 2))
    }

    #[test]
    fn test_plays_to_end_then_finishes() {
        let mut source = BufferSource::start(buffer(3), 0.0);
        assert_eq!(source.next_frame(), Some(AudioFrame::from_stereo(0.0, -0.0)));
        assert_eq!(source.next_frame(), Some(AudioFrame::from_stereo(1.0, -1.0)));
        assert!(!source.is_finished());
        assert!(source.next_frame().is_some());
        assert!(source.is_finished());
        assert_eq!(source.next_frame(), None);
        assert_eq!(source.stop(), StopOutcome::AlreadyStopped);
    }

    #[test]
    fn test_starts_from_offset() {
        let mut source = BufferSource::start(buffer(20), 0.5);
        assert_eq!(source.start_offset_secs(), 0.5);
        assert_eq!(source.next_frame(), Some(AudioFrame::from_stereo(5.0, -5.0)));
        assert!((source.position_secs() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_double_stop_is_harmless() {
        let mut source = BufferSource::start(buffer(10), 0.0);
        assert_eq!(source.stop(), StopOutcome::Stopped);
        assert_eq!(source.stop(), StopOutcome::AlreadyStopped);
        assert_eq!(source.next_frame(), None);
        assert!(!source.is_playing());
    }

    #[test]
    fn test_offset_past_end_is_finished() {
        let mut source = BufferSource::start(buffer(10), 5.0);
        assert!(source.is_finished());
        assert_eq!(source.next_frame(), None);
    }
}
