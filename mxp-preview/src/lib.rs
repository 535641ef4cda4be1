//! # MXP Preview Library (mxp-preview)
//!
//! Audio preview orchestrator for backend-rendered mixes.
//!
//! **Purpose:** Fetch rendered preview audio from the mixing backend, decode it,
//! run it through a reverb → delay → filter effects chain, play it on one shared
//! audio context, and publish live spectrum/stereo analysis.
//!
//! **Architecture:** reqwest → symphonia + rubato → effect graph → cpal, with
//! analysis published on the shared EventBus.

pub mod analysis;
pub mod audio;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod graph;
pub mod options;
pub mod orchestrator;

pub use error::{Error, Result};
pub use options::{AudioPreviewOptions, EffectChainConfig, Format, PreviewRequest, Quality};
pub use orchestrator::{OrchestratorSettings, PreviewInfo, PreviewOrchestrator};
