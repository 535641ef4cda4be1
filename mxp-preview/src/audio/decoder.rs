//! Audio decoder using symphonia
//!
//! Decodes rendered preview bytes (MP3, WAV) held in memory to interleaved stereo
//! f32 PCM, then resamples to the audio context rate.

use crate::audio::resampler::Resampler;
use crate::audio::types::DecodedAudioBuffer;
use crate::error::{Error, Result};
use crate::options::Format;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// PCM produced by the decoder before resampling
#[derive(Debug, Clone)]
pub struct DecodedPcm {
    /// Interleaved stereo samples
    pub samples: Vec<f32>,
    /// Sample rate of the encoded audio
    pub sample_rate: u32,
    /// Channel count of the encoded audio
    pub channels: u16,
}

/// Decoder for rendered preview audio.
pub struct PreviewDecoder;

impl PreviewDecoder {
    /// Decode `bytes` and resample to `target_rate`.
    ///
    /// # Errors
    /// `Error::Decode` when the bytes are not a supported audio stream or
    /// contain no decodable audio.
    pub fn decode(
        bytes: Vec<u8>,
        format: Option<Format>,
        target_rate: u32,
    ) -> Result<DecodedAudioBuffer> {
        let pcm = Self::decode_pcm(bytes, format)?;
        let samples = Resampler::resample(&pcm.samples, pcm.sample_rate, target_rate, 2)?;
        Ok(DecodedAudioBuffer::new(samples, target_rate, pcm.channels))
    }

    /// Decode `bytes` to interleaved stereo at the source sample rate.
    pub fn decode_pcm(bytes: Vec<u8>, format: Option<Format>) -> Result<DecodedPcm> {
        debug!("Decoding {} bytes of preview audio", bytes.len());

        if bytes.is_empty() {
            return Err(Error::Decode("Empty audio payload".to_string()));
        }

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(format) = format {
            hint.with_extension(format.extension());
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let mut reader = probed.format;

        // Get the default audio track
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        debug!(
            "Audio format: sample_rate={}, channels={}",
            sample_rate, channels
        );

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();
        let mut sample_buffer: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Decoder reset required mid-stream, stopping decode");
                    break;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    break;
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let capacity = decoded.capacity() as u64;
                    let buffer =
                        sample_buffer.get_or_insert_with(|| SampleBuffer::new(capacity, spec));
                    if buffer.capacity() < decoded.capacity() * spec.channels.count() {
                        *buffer = SampleBuffer::new(capacity, spec);
                    }
                    buffer.copy_interleaved_ref(decoded);
                    Self::append_as_stereo(buffer.samples(), spec.channels.count(), &mut samples);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Decoder failed: {}", e)));
                }
            }
        }

        if samples.is_empty() {
            return Err(Error::Decode("No audio frames decoded".to_string()));
        }

        debug!("Decoded {} stereo frames", samples.len() / 2);

        Ok(DecodedPcm {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Append interleaved samples with `channels` channels as stereo.
    ///
    /// Mono is duplicated to both sides; channels beyond the second are dropped.
    fn append_as_stereo(interleaved: &[f32], channels: usize, output: &mut Vec<f32>) {
        match channels {
            0 => {}
            1 => {
                output.reserve(interleaved.len() * 2);
                for &sample in interleaved {
                    output.push(sample);
                    output.push(sample);
                }
            }
            2 => output.extend_from_slice(interleaved),
            n => {
                output.reserve(interleaved.len() / n * 2);
                for frame in interleaved.chunks_exact(n) {
                    output.push(frame[0]);
                    output.push(frame[1]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                let value = ((i % 100) as i16 - 50) * 200;
                for _ in 0..channels {
                    writer.write_sample(value).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_stereo_wav() {
        let pcm = PreviewDecoder::decode_pcm(wav_bytes(44100, 2, 4410), Some(Format::Wav)).unwrap();
        assert_eq!(pcm.sample_rate, 44100);
        assert_eq!(pcm.channels, 2);
        assert_eq!(pcm.samples.len(), 4410 * 2);
    }

    #[test]
    fn test_decode_mono_wav_duplicates_channels() {
        let pcm = PreviewDecoder::decode_pcm(wav_bytes(22050, 1, 1000), None).unwrap();
        assert_eq!(pcm.channels, 1);
        assert_eq!(pcm.samples.len(), 2000);
        for frame in pcm.samples.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_decode_to_context_rate() {
        let buffer =
            PreviewDecoder::decode(wav_bytes(44100, 2, 44100), Some(Format::Wav), 44100).unwrap();
        assert_eq!(buffer.sample_rate(), 44100);
        assert_eq!(buffer.frame_count(), 44100);
        assert!((buffer.duration_secs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_garbage_bytes_are_decode_error() {
        let result = PreviewDecoder::decode(vec![0x42; 2048], Some(Format::Mp3), 44100);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_empty_payload_is_decode_error() {
        let result = PreviewDecoder::decode_pcm(Vec::new(), Some(Format::Wav));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_append_as_stereo_folds_surround() {
        let mut out = Vec::new();
        PreviewDecoder::append_as_stereo(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, &mut out);
        assert_eq!(out, vec![1.0, 2.0, 4.0, 5.0]);
    }
}
