//! Live analysis of the playing preview
//!
//! Frames flow render callback → `tap` → `driver`, which runs a `spectrum`
//! analyzer once per display frame and publishes `PreviewEvent::AnalysisUpdate`.

pub mod driver;
pub mod spectrum;
pub mod tap;

pub use driver::{spawn_analysis_driver, AnalysisSettings};
pub use spectrum::SpectrumAnalyzer;
pub use tap::{analysis_tap, TapReader, TapWriter, DEFAULT_TAP_CAPACITY};
