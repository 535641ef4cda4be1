//! Test helpers for mxp-preview integration tests
//!
//! - MockBackend: in-process render backend serving WAV previews
//! - audio_generator: sine WAV payloads

pub mod audio_generator;
pub mod mock_backend;

#[allow(unused_imports)]
pub use audio_generator::sine_wav;
#[allow(unused_imports)]
pub use mock_backend::{MockBackend, RecordedRequest};
