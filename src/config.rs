//! Configuration for the generation pipeline.
//!
//! One [`MusicConfig`] is built at process start (file, then environment
//! overrides) and passed to every component. Nothing below the CLI reads the
//! environment on its own.

use crate::api::MusicModel;
use crate::credentials::SecretRef;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    /// Verbose logging.
    pub debug: bool,
    /// Remote API settings.
    pub api: ApiConfig,
    /// Defaults for new generation requests.
    pub generation: GenerationConfig,
    /// Poll loop timing.
    pub poll: PollConfig,
    /// Download settings.
    pub download: DownloadConfig,
    /// External player settings.
    pub playback: PlaybackConfig,
}

/// Remote API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the generation API.
    pub base_url: String,
    /// Callback URL sent with each request. The pipeline polls instead, so
    /// this may point at a no-op sink.
    pub callback_url: String,
    /// Per-request timeout in seconds, independent of the poll interval.
    pub request_timeout_secs: u64,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Where the bearer token comes from.
    pub api_key: SecretRef,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://apibox.erweima.ai".to_owned(),
            callback_url: "https://httpbin.org/post".to_owned(),
            request_timeout_secs: 30,
            user_agent: concat!("voice2music/", env!("CARGO_PKG_VERSION")).to_owned(),
            api_key: SecretRef::default(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Defaults applied to requests built by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Model used when the request does not name one.
    pub model: MusicModel,
    /// Generate instrumentals by default.
    pub instrumental: bool,
}

/// Poll loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between status queries.
    pub interval_secs: u64,
    /// Total wait budget in seconds.
    pub max_wait_secs: u64,
    /// Seconds to wait before the first status query.
    pub initial_delay_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            max_wait_secs: 360,
            initial_delay_secs: 0,
        }
    }
}

/// Download configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory receiving `.mp3` files. Created when absent.
    pub dir: PathBuf,
    /// Time budget for one download, in seconds.
    pub timeout_secs: u64,
    /// Wait for fully rendered audio before downloading. When false the
    /// pipeline streams as soon as a stream URL appears.
    pub wait_for_completion: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dir: crate::app_dirs::downloads_dir(),
            timeout_secs: 60,
            wait_for_completion: true,
        }
    }
}

/// External player configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Players to try, in order of preference.
    pub players: Vec<String>,
    /// Volume passed to the player (0–130, mpv scale).
    pub volume: u8,
    /// Budget for one blocking playback, in seconds.
    pub timeout_secs: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            players: crate::playback::DEFAULT_PLAYERS
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
            volume: 70,
            timeout_secs: 600,
        }
    }
}

impl MusicConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from `path` when it exists, otherwise start from defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let file_err = |e: std::io::Error| ConfigError::File {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(file_err)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(file_err)?;
        Ok(())
    }

    /// Apply the process environment on top of file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup.
    ///
    /// Recognised keys: `SUNO_API_KEY`, `SUNO_MODEL_VERSION`, `DOWNLOADS_DIR`,
    /// `DEBUG`, `WAIT_AUDIO`, `V2M_BASE_URL`.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.api.api_key == SecretRef::None && lookup("SUNO_API_KEY").is_some() {
            self.api.api_key = SecretRef::Env {
                var: "SUNO_API_KEY".to_owned(),
            };
        }
        if let Some(model) = lookup("SUNO_MODEL_VERSION") {
            match model.parse() {
                Ok(m) => self.generation.model = m,
                Err(e) => tracing::warn!("ignoring SUNO_MODEL_VERSION: {e}"),
            }
        }
        if let Some(dir) = lookup("DOWNLOADS_DIR") {
            self.download.dir = PathBuf::from(dir);
        }
        if let Some(debug) = lookup("DEBUG") {
            self.debug = parse_flag(&debug);
        }
        if let Some(wait) = lookup("WAIT_AUDIO") {
            self.download.wait_for_completion = parse_flag(&wait);
        }
        if let Some(url) = lookup("V2M_BASE_URL") {
            self.api.base_url = url;
        }
    }

    /// Check values that would otherwise fail deep inside a run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.api.base_url)
            .map_err(|e| ConfigError::Invalid(format!("api.base_url: {e}")))?;
        url::Url::parse(&self.api.callback_url)
            .map_err(|e| ConfigError::Invalid(format!("api.callback_url: {e}")))?;
        if self.api.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "api.request_timeout_secs must be positive".to_owned(),
            ));
        }
        if self.poll.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll.interval_secs must be positive".to_owned(),
            ));
        }
        if self.poll.max_wait_secs < self.poll.interval_secs {
            return Err(ConfigError::Invalid(format!(
                "poll.max_wait_secs ({}) is shorter than poll.interval_secs ({})",
                self.poll.max_wait_secs, self.poll.interval_secs
            )));
        }
        if self.download.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "download.timeout_secs must be positive".to_owned(),
            ));
        }
        if self.playback.volume > 130 {
            return Err(ConfigError::Invalid(format!(
                "playback.volume {} exceeds 130",
                self.playback.volume
            )));
        }
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
