//! Configuration management for mxp-preview
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (`--api-base-url`, `--device`)
//! 2. Environment variables (`MXP_API_BASE_URL`, `MXP_AUDIO_DEVICE`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! clap resolves 1 and 2 together; `Config::resolve` layers the result over the
//! TOML file.

use crate::analysis::AnalysisSettings;
use crate::error::Result;
use crate::options::{Format, Quality, DEFAULT_PREVIEW_DURATION_SECS};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Backend used when nothing else is configured
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// Default event bus capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub preview: PreviewDefaults,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Render backend connection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout in seconds; unset means requests never time out
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// Output device selection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioConfig {
    /// Output device name (default device when unset or not found)
    #[serde(default)]
    pub device: Option<String>,

    /// Frames per device callback (device default when unset)
    #[serde(default)]
    pub buffer_size: Option<u32>,
}

/// Defaults applied to preview requests
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewDefaults {
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: f64,

    #[serde(default)]
    pub quality: Quality,

    #[serde(default)]
    pub format: Format,
}

impl Default for PreviewDefaults {
    fn default() -> Self {
        Self {
            default_duration_secs: default_duration_secs(),
            quality: Quality::default(),
            format: Format::default(),
        }
    }
}

/// Live analysis loop
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_frame_rate_hz")]
    pub frame_rate_hz: u32,

    #[serde(default = "default_fft_size")]
    pub fft_size: usize,

    #[serde(default = "default_waveform_len")]
    pub waveform_len: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frame_rate_hz: default_frame_rate_hz(),
            fft_size: default_fft_size(),
            waveform_len: default_waveform_len(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_duration_secs() -> f64 {
    DEFAULT_PREVIEW_DURATION_SECS
}

fn default_true() -> bool {
    true
}

fn default_frame_rate_hz() -> u32 {
    60
}

fn default_fft_size() -> usize {
    2048
}

fn default_waveform_len() -> usize {
    1024
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Load `path`, falling back to defaults when it cannot be read.
    ///
    /// Returns the warning to log once logging is up; a broken config file is
    /// never fatal.
    pub fn load(path: Option<&Path>) -> (Self, Option<String>) {
        let Some(path) = path else {
            return (Self::default(), None);
        };

        match mxp_common::config::load_toml_file::<TomlConfig>(path) {
            Ok(config) => (config, None),
            Err(e) => (
                Self::default(),
                Some(format!("{} (using built-in defaults)", e)),
            ),
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub device: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout: Option<Duration>,
    pub device: Option<String>,
    pub buffer_size: Option<u32>,
    pub default_duration_secs: f64,
    pub quality: Quality,
    pub format: Format,
    pub analysis: AnalysisSettings,
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve(TomlConfig::default(), ConfigOverrides::default())
    }
}

impl Config {
    /// Layer `overrides` over `toml`
    pub fn resolve(toml: TomlConfig, overrides: ConfigOverrides) -> Self {
        let default_duration_secs = if toml.preview.default_duration_secs.is_finite()
            && toml.preview.default_duration_secs > 0.0
        {
            toml.preview.default_duration_secs
        } else {
            warn!(
                "Invalid preview.default_duration_secs {}, using {}",
                toml.preview.default_duration_secs, DEFAULT_PREVIEW_DURATION_SECS
            );
            DEFAULT_PREVIEW_DURATION_SECS
        };

        Self {
            api_base_url: overrides
                .api_base_url
                .or(toml.backend.base_url)
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            request_timeout: overrides
                .request_timeout_secs
                .or(toml.backend.request_timeout_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            device: overrides.device.or(toml.audio.device),
            buffer_size: toml.audio.buffer_size,
            default_duration_secs,
            quality: toml.preview.quality,
            format: toml.preview.format,
            analysis: AnalysisSettings {
                enabled: toml.analysis.enabled,
                frame_rate_hz: toml.analysis.frame_rate_hz.max(1),
                fft_size: toml.analysis.fft_size,
                waveform_len: toml.analysis.waveform_len,
            },
            event_capacity: toml.events.capacity.max(1),
        }
    }

    /// Convenience for tests and embedding: defaults pointed at `api_base_url`
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self::resolve(
            TomlConfig::default(),
            ConfigOverrides {
                api_base_url: Some(api_base_url.into()),
                ..Default::default()
            },
        )
    }

    /// Validate values that cannot be checked at parse time
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.api_base_url).map_err(|e| {
            crate::Error::Config(format!(
                "Invalid API base URL '{}': {}",
                self.api_base_url, e
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.default_duration_secs, 5.0);
        assert_eq!(config.analysis.frame_rate_hz, 60);
        assert_eq!(config.analysis.fft_size, 2048);
        assert!(config.analysis.enabled);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_sections_parse() {
        let toml: TomlConfig = toml::from_str(
            r#"
            [backend]
            base_url = "http://render.local:9000"
            request_timeout_secs = 30

            [audio]
            device = "USB DAC"

            [preview]
            default_duration_secs = 8.0
            quality = "high"
            format = "wav"

            [analysis]
            frame_rate_hz = 30
            enabled = false

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        let config = Config::resolve(toml, ConfigOverrides::default());
        assert_eq!(config.api_base_url, "http://render.local:9000");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.device.as_deref(), Some("USB DAC"));
        assert_eq!(config.default_duration_secs, 8.0);
        assert_eq!(config.quality, Quality::High);
        assert_eq!(config.format, Format::Wav);
        assert_eq!(config.analysis.frame_rate_hz, 30);
        assert_eq!(config.analysis.fft_size, 2048);
        assert!(!config.analysis.enabled);
    }

    #[test]
    fn test_overrides_beat_toml() {
        let toml: TomlConfig = toml::from_str(
            "[backend]\nbase_url = \"http://from-toml\"\n[audio]\ndevice = \"toml-device\"\n",
        )
        .unwrap();
        let config = Config::resolve(
            toml,
            ConfigOverrides {
                api_base_url: Some("http://from-cli".to_string()),
                device: Some("cli-device".to_string()),
                request_timeout_secs: Some(0),
            },
        );

        assert_eq!(config.api_base_url, "http://from-cli");
        assert_eq!(config.device.as_deref(), Some("cli-device"));
        // Zero means no timeout
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn test_missing_file_falls_back_with_warning() {
        let (config, warning) = TomlConfig::load(Some(Path::new("/nonexistent/mxp/config.toml")));
        assert!(warning.is_some());
        assert_eq!(config.preview.default_duration_secs, 5.0);

        let (_, none) = TomlConfig::load(None);
        assert!(none.is_none());
    }

    #[test]
    fn test_invalid_base_url_fails_validation() {
        let config = Config::with_base_url("::not a url::");
        assert!(config.validate().is_err());
    }
}
