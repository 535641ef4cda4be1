//! Offline audio output
//!
//! Pulls frames only when asked. Used to render previews to WAV without a sound
//! device and to drive the audio graph deterministically in tests.

use crate::audio::output::{AudioOutput, OutputFactory, RenderCallback};
use crate::audio::types::AudioFrame;
use crate::error::{Error, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Output with no device; frames are rendered through an `OfflineHandle`
#[derive(Clone)]
pub struct OfflineOutput {
    callback: Arc<Mutex<Option<RenderCallback>>>,
    sample_rate: u32,
}

impl OfflineOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            callback: Arc::new(Mutex::new(None)),
            sample_rate,
        }
    }

    /// Handle that renders frames from whatever callback is currently started
    pub fn handle(&self) -> OfflineHandle {
        OfflineHandle {
            callback: Arc::clone(&self.callback),
        }
    }

    /// Factory opening clones of this output, all sharing one handle
    pub fn factory(&self) -> impl OutputFactory + 'static {
        let output = self.clone();
        move || -> Result<Box<dyn AudioOutput>> { Ok(Box::new(output.clone())) }
    }
}

impl AudioOutput for OfflineOutput {
    fn start(&mut self, callback: RenderCallback) -> Result<()> {
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.callback.lock().take();
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        2
    }

    fn device_name(&self) -> String {
        "offline".to_string()
    }
}

/// Pulls frames from an `OfflineOutput`
#[derive(Clone)]
pub struct OfflineHandle {
    callback: Arc<Mutex<Option<RenderCallback>>>,
}

impl OfflineHandle {
    /// Render `frames` frames; silence when the output is stopped
    pub fn render(&self, frames: usize) -> Vec<AudioFrame> {
        let mut guard = self.callback.lock();
        match guard.as_mut() {
            Some(callback) => (0..frames).map(|_| callback()).collect(),
            None => vec![AudioFrame::zero(); frames],
        }
    }

    pub fn is_started(&self) -> bool {
        self.callback.lock().is_some()
    }
}

/// Write stereo frames to a 16-bit PCM WAV file
pub fn write_wav(path: &Path, frames: &[AudioFrame], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let to_wav_error = |e: hound::Error| match e {
        hound::Error::IoError(io) => Error::Io(io),
        other => Error::Internal(format!("WAV write failed: {}", other)),
    };

    let mut writer = WavWriter::create(path, spec).map_err(to_wav_error)?;
    for frame in frames {
        let mut frame = *frame;
        frame.clamp();
        writer
            .write_sample((frame.left * i16::MAX as f32) as i16)
            .map_err(to_wav_error)?;
        writer
            .write_sample((frame.right * i16::MAX as f32) as i16)
            .map_err(to_wav_error)?;
    }
    writer.finalize().map_err(to_wav_error)?;

    debug!("Wrote {} frames to {}", frames.len(), path.display());
    Ok(())
}
