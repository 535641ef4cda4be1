//! Preview request and effect chain configuration types
//!
//! These types serialize to the JSON body the render endpoints expect
//! (`{"duration": 5.0, "quality": "medium", "format": "mp3", "effects": {...}}`).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Preview length used when the caller does not specify one
pub const DEFAULT_PREVIEW_DURATION_SECS: f64 = 5.0;

/// Render quality requested from the backend
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

/// Encoded audio format requested from the backend
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Mp3,
    Wav,
}

impl Format {
    /// File extension, also used as the decoder probe hint
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Mp3 => "mp3",
            Format::Wav => "wav",
        }
    }

    /// MIME type the backend answers with
    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Mp3 => "audio/mpeg",
            Format::Wav => "audio/wav",
        }
    }
}

/// Convolution reverb stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverbConfig {
    pub enabled: bool,
    /// Wet level, 0-100
    pub amount: f32,
    /// Impulse response length in seconds
    pub decay: f32,
}

/// Feedback delay stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayConfig {
    pub enabled: bool,
    /// Delay time in milliseconds
    pub time: f32,
    /// Feedback amount, 0-100
    pub feedback: f32,
}

/// Low-pass filter stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub enabled: bool,
    /// Cutoff frequency in Hz
    pub frequency: f32,
    /// Resonance (Q)
    pub resonance: f32,
}

/// Effects applied to a preview, in the fixed order reverb → delay → filter.
///
/// Entries that are absent or have `enabled: false` produce no node at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectChainConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverb: Option<ReverbConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<DelayConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterConfig>,
}

impl EffectChainConfig {
    pub fn enabled_reverb(&self) -> Option<&ReverbConfig> {
        self.reverb.as_ref().filter(|r| r.enabled)
    }

    pub fn enabled_delay(&self) -> Option<&DelayConfig> {
        self.delay.as_ref().filter(|d| d.enabled)
    }

    pub fn enabled_filter(&self) -> Option<&FilterConfig> {
        self.filter.as_ref().filter(|f| f.enabled)
    }

    /// Number of stages the chain will contain
    pub fn enabled_count(&self) -> usize {
        usize::from(self.enabled_reverb().is_some())
            + usize::from(self.enabled_delay().is_some())
            + usize::from(self.enabled_filter().is_some())
    }
}

/// Caller-facing preview options; every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPreviewOptions {
    /// Preview length in seconds (defaults to 5s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub format: Format,
    #[serde(default)]
    pub effects: EffectChainConfig,
}

/// A fully resolved, immutable preview request.
///
/// Built per invocation from `AudioPreviewOptions`; the session id travels in the
/// URL, everything else in the JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[serde(skip)]
    session_id: String,
    duration: f64,
    quality: Quality,
    format: Format,
    effects: EffectChainConfig,
}

impl PreviewRequest {
    /// Resolve options into a request, applying `default_duration` when unset
    pub fn new(
        session_id: impl Into<String>,
        options: &AudioPreviewOptions,
        default_duration: f64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            duration: options.duration.unwrap_or(default_duration),
            quality: options.quality,
            format: options.format,
            effects: options.effects.clone(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn effects(&self) -> &EffectChainConfig {
        &self.effects
    }

    /// Key identifying the rendered audio for this request in the buffer cache
    pub fn cache_key(&self) -> Result<String> {
        let body = serde_json::to_string(self)
            .map_err(|e| Error::Internal(format!("Failed to serialize preview request: {}", e)))?;
        Ok(format!("{}:{}", self.session_id, body))
    }
}
