//! Sample rate conversion with rubato
//!
//! A rendered preview is converted once, right after decoding, to the rate of
//! the audio context that will play it. Sources never convert in the render
//! callback.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as _};
use tracing::debug;

/// Whole-buffer resampler for decoded previews.
pub struct Resampler;

impl Resampler {
    /// Convert interleaved `input` with `channels` channels from `from_rate`
    /// to `to_rate`.
    ///
    /// The whole buffer is processed as a single chunk; previews are short.
    pub fn resample(
        input: &[f32],
        from_rate: u32,
        to_rate: u32,
        channels: u16,
    ) -> Result<Vec<f32>> {
        if from_rate == to_rate || input.is_empty() {
            return Ok(input.to_vec());
        }
        if from_rate == 0 || to_rate == 0 || channels == 0 {
            return Err(Error::Decode(format!(
                "Unsupported conversion {}Hz -> {}Hz for {} channel(s)",
                from_rate, to_rate, channels
            )));
        }

        let planes = Self::split_channels(input, channels as usize);
        let frames_in = planes[0].len();
        let ratio = to_rate as f64 / from_rate as f64;

        let mut converter = FastFixedIn::<f32>::new(
            ratio,
            1.0,
            PolynomialDegree::Septic,
            frames_in,
            planes.len(),
        )
        .map_err(|e| Error::Decode(format!("Resampler setup failed: {}", e)))?;

        let converted = converter
            .process(&planes, None)
            .map_err(|e| Error::Decode(format!("Sample rate conversion failed: {}", e)))?;
        let output = Self::merge_channels(&converted);

        debug!(
            from_rate,
            to_rate,
            frames_in,
            frames_out = output.len() / planes.len(),
            "Preview resampled"
        );
        Ok(output)
    }

    /// Interleaved samples to one vector per channel; a trailing partial frame is dropped
    fn split_channels(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
        (0..channels)
            .map(|channel| {
                interleaved
                    .chunks_exact(channels)
                    .map(|frame| frame[channel])
                    .collect()
            })
            .collect()
    }

    /// One vector per channel back to interleaved samples
    fn merge_channels(planes: &[Vec<f32>]) -> Vec<f32> {
        let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
        (0..frames)
            .flat_map(|frame| planes.iter().map(move |plane| plane[frame]))
            .collect()
    }
}
