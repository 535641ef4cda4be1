//! Audio decoding, resampling and device output

pub mod decoder;
pub mod offline;
pub mod output;
pub mod resampler;
pub mod types;

pub use decoder::PreviewDecoder;
pub use offline::{write_wav, OfflineHandle, OfflineOutput};
pub use output::{AudioOutput, CpalOutput, CpalOutputFactory, OutputFactory, RenderCallback};
pub use resampler::Resampler;
pub use types::{AudioFrame, DecodedAudioBuffer};
