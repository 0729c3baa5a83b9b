//! Centralized application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/voice2music/` | `~/.local/share/voice2music/` |
//! | Config | `~/Library/Application Support/voice2music/` | `~/.config/voice2music/` |
//!
//! # Environment Overrides
//!
//! - `V2M_DATA_DIR`: overrides [`data_dir`]
//! - `V2M_CONFIG_DIR`: overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Resolves to `dirs::data_dir()/voice2music/` by default. Override with
/// the `V2M_DATA_DIR` environment variable.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("V2M_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("voice2music"))
        .unwrap_or_else(|| PathBuf::from("/tmp/voice2music-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/voice2music/` by default. Override with
/// the `V2M_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("V2M_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("voice2music"))
        .unwrap_or_else(|| PathBuf::from("/tmp/voice2music-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default download directory (`data_dir()/downloads/`).
#[must_use]
pub fn downloads_dir() -> PathBuf {
    data_dir().join("downloads")
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_is_nonempty() {
        let dir = data_dir();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn config_file_ends_with_config_toml() {
        let path = config_file();
        let s = path.to_string_lossy();
        assert!(s.ends_with("config.toml"), "config_file: {s}");
    }

    #[test]
    fn downloads_dir_is_subpath_of_data_dir() {
        let downloads = downloads_dir();
        let data = data_dir();
        assert!(
            downloads.starts_with(&data),
            "downloads_dir ({}) should start with data_dir ({})",
            downloads.display(),
            data.display()
        );
    }

    #[test]
    fn logs_dir_is_subpath_of_data_dir() {
        let logs = logs_dir();
        let data = data_dir();
        assert!(
            logs.starts_with(&data),
            "logs_dir ({}) should start with data_dir ({})",
            logs.display(),
            data.display()
        );
    }
}
