//! Error types for the voice2music pipeline.
//!
//! Each stage owns a narrow error enum; [`MusicError`] collects them at the
//! boundary and maps every variant to a process exit code.

use std::path::PathBuf;

/// Stable process exit codes for the `v2m` binary.
pub mod exit_codes {
    /// Everything succeeded.
    pub const SUCCESS: i32 = 0;
    /// Invalid configuration or usage.
    pub const CONFIG: i32 = 1;
    /// The generation request could not be submitted.
    pub const SUBMISSION: i32 = 2;
    /// The API reported that generation failed.
    pub const GENERATION_FAILED: i32 = 3;
    /// The wait budget ran out before the task finished.
    pub const TIMEOUT: i32 = 4;
    /// At least one track could not be downloaded.
    pub const RETRIEVAL: i32 = 5;
    /// The user interrupted the run.
    pub const CANCELLED: i32 = 130;
}

/// Failure to create a generation task.
///
/// This is the only stage allowed to reject a task; once a
/// [`TaskHandle`](crate::api::TaskHandle) exists it is trusted downstream.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// The request was rejected locally before any network call.
    #[error("invalid generation request: {0}")]
    InvalidRequest(String),

    /// Network failure or request timeout.
    #[error("submission request failed: {0}")]
    Transport(String),

    /// The API answered with a non-2xx status.
    #[error("submission rejected with HTTP {status}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The API answered 2xx but its envelope carried an error code.
    #[error("submission rejected by API (code {code}): {message}")]
    Rejected {
        /// Envelope `code` field.
        code: i64,
        /// Envelope `msg` field.
        message: String,
        /// Raw response body.
        body: String,
    },

    /// The response did not contain a task identifier.
    #[error("submission response has no task id")]
    MissingTaskId {
        /// Raw response body.
        body: String,
    },
}

impl SubmissionError {
    /// Raw API payload attached to this error, if any.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            Self::HttpStatus { body, .. }
            | Self::Rejected { body, .. }
            | Self::MissingTaskId { body } => Some(body),
            Self::InvalidRequest(_) | Self::Transport(_) => None,
        }
    }
}

/// Failure of a status or credits query.
///
/// Inside the poll loop these are transient faults: logged and treated as
/// an unknown status for that tick.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network failure or request timeout.
    #[error("request failed: {0}")]
    Transport(String),

    /// Non-2xx response.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The body could not be understood.
    #[error("unexpected response: {message}")]
    Malformed {
        /// What was wrong.
        message: String,
        /// Raw response body.
        body: String,
    },
}

/// Failure to download one track.
///
/// Fatal for that track only: other tracks of the same batch may still be
/// retrieved and offered.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// The track has neither a final nor a stream URL.
    #[error("track '{0}' has no downloadable URL")]
    NoUrl(String),

    /// The download did not finish within its time budget.
    #[error("download of {url} exceeded {secs}s")]
    Timeout {
        /// Source URL.
        url: String,
        /// Budget in seconds.
        secs: u64,
    },

    /// Network failure.
    #[error("download of {url} failed: {message}")]
    Transport {
        /// Source URL.
        url: String,
        /// Transport error description.
        message: String,
    },

    /// Non-2xx response.
    #[error("download of {url} returned HTTP {status}")]
    HttpStatus {
        /// Source URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Local filesystem error.
    #[error("download I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to hand a resource to an external player.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    /// None of the configured players is installed.
    ///
    /// Not fatal: the locator is returned so it can be shown to the user.
    #[error("no audio player available; resource is at {locator}")]
    NoPlayerAvailable {
        /// URL or local path that could not be played.
        locator: String,
    },

    /// The player process could not be started or awaited.
    #[error("failed to run {player}: {message}")]
    Spawn {
        /// Player name.
        player: String,
        /// OS error description.
        message: String,
    },

    /// The player ran longer than the playback budget and was stopped.
    #[error("{player} exceeded the {secs}s playback budget")]
    Timeout {
        /// Player name.
        player: String,
        /// Budget in seconds.
        secs: u64,
    },
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("config file {path}: {message}")]
    File {
        /// Path of the config file.
        path: String,
        /// Underlying error.
        message: String,
    },

    /// The file is not valid TOML for [`MusicConfig`](crate::config::MusicConfig).
    #[error("invalid config: {0}")]
    Parse(String),

    /// A value is out of range or inconsistent.
    #[error("invalid config value: {0}")]
    Invalid(String),

    /// The API key could not be resolved.
    #[error("api key: {0}")]
    Secret(String),
}

/// Top-level error type for a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum MusicError {
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Submission failed.
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// The API reported that the generation failed.
    #[error("generation {task_id} failed: {reason}")]
    GenerationFailed {
        /// Task identifier.
        task_id: String,
        /// Reason stated by the API.
        reason: String,
        /// Raw status payload.
        body: String,
    },

    /// The wait budget ran out. The task may still finish server-side.
    #[error("generation {task_id} did not finish within {elapsed_secs}s; check again later")]
    TimeoutExceeded {
        /// Task identifier to resume with.
        task_id: String,
        /// Seconds waited, rounded up.
        elapsed_secs: u64,
        /// Partial stream URLs that were not played.
        unplayed: Vec<String>,
    },

    /// The user interrupted the run.
    #[error("cancelled by user")]
    UserCancelled,

    /// Status or credits query failed outside the poll loop.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// One or more tracks could not be downloaded.
    #[error("{failed} of {total} track download(s) failed: {first}")]
    Retrieval {
        /// Number of failed downloads.
        failed: usize,
        /// Number of attempted downloads.
        total: usize,
        /// First failure.
        first: RetrievalError,
        /// Tracks that did download.
        saved: Vec<PathBuf>,
        /// Saved tracks that were not played.
        unplayed: Vec<String>,
    },

    /// Playback failed.
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MusicError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => exit_codes::CONFIG,
            Self::Submission(_) => exit_codes::SUBMISSION,
            Self::GenerationFailed { .. } => exit_codes::GENERATION_FAILED,
            Self::TimeoutExceeded { .. } => exit_codes::TIMEOUT,
            Self::UserCancelled => exit_codes::CANCELLED,
            Self::Retrieval { .. } => exit_codes::RETRIEVAL,
            Self::Api(_) | Self::Playback(_) | Self::Io(_) => exit_codes::CONFIG,
        }
    }

    /// Locators the user can still play by hand.
    pub fn unplayed(&self) -> &[String] {
        match self {
            Self::TimeoutExceeded { unplayed, .. } | Self::Retrieval { unplayed, .. } => unplayed,
            _ => &[],
        }
    }

    /// Files written before the run failed.
    pub fn saved(&self) -> &[PathBuf] {
        match self {
            Self::Retrieval { saved, .. } => saved,
            _ => &[],
        }
    }

    /// Raw API payload for diagnostics, when the failure carried one.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            Self::Submission(e) => e.raw_body(),
            Self::GenerationFailed { body, .. } => Some(body),
            Self::Api(ApiError::HttpStatus { body, .. } | ApiError::Malformed { body, .. }) => {
                Some(body)
            }
            _ => None,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, MusicError>;
