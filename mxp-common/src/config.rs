//! Configuration file discovery and TOML loading
//!
//! Config file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/mxp/config.toml`)
//! 4. System-wide config (`/etc/mxp/config.toml`, Linux only)
//!
//! A missing config file is never fatal: callers fall back to built-in defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name used under the platform config directory
pub const CONFIG_DIR_NAME: &str = "mxp";

/// File name of the TOML configuration
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MXP_CONFIG";

/// Resolve which config file to read, if any.
///
/// Explicit paths (CLI argument, environment variable) are returned even when the
/// file does not exist so the loader can report it. Discovered default paths are
/// only returned when present on disk.
pub fn resolve_config_file(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3/4: platform locations
    default_config_file()
}

/// Locate the default config file for the platform
pub fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));

    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Read and deserialize a TOML file
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!("Loading config file: {}", path.display());

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    toml::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn test_cli_argument_wins() {
        let path = PathBuf::from("/tmp/explicit.toml");
        let resolved = resolve_config_file(Some(&path), "MXP_TEST_UNUSED_VAR");
        assert_eq!(resolved, Some(path));
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.toml");
        std::fs::write(&path, "name = \"preview\"\ncount = 3\n").unwrap();

        let sample: Sample = load_toml_file(&path).unwrap();
        assert_eq!(sample.name, "preview");
        assert_eq!(sample.count, 3);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let result: Result<Sample> = load_toml_file(Path::new("/nonexistent/mxp/config.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "name = [unterminated").unwrap();

        let result: Result<Sample> = load_toml_file(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
