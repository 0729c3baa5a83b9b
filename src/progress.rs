//! Progress event types for polling and downloads.
//!
//! Provides callback-based progress reporting that decouples the pipeline
//! from presentation (the CLI renders events with indicatif).

use std::path::PathBuf;

/// Progress events emitted while a generation request runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The API accepted the request.
    Submitted {
        /// Task identifier returned by the API.
        task_id: String,
    },

    /// One status query completed.
    PollTick {
        /// Task identifier.
        task_id: String,
        /// 1-based tick number.
        tick: u32,
        /// Seconds since polling started.
        elapsed_secs: f64,
        /// Short status label (`pending`, `partial`, `complete`, …).
        status: String,
    },

    /// A track download has started.
    DownloadStarted {
        /// Track title.
        title: String,
        /// Final destination path.
        path: PathBuf,
        /// Total size in bytes, if the server reported one.
        total_bytes: Option<u64>,
    },

    /// Download progress update.
    DownloadProgress {
        /// Track title.
        title: String,
        /// Bytes written so far.
        bytes_downloaded: u64,
        /// Total size in bytes, if known.
        total_bytes: Option<u64>,
    },

    /// A track download completed and was moved into place.
    DownloadComplete {
        /// Track title.
        title: String,
        /// Final destination path.
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
    },

    /// A player was launched.
    PlaybackStarted {
        /// Player program name.
        player: String,
        /// Path or URL handed to the player.
        locator: String,
    },
}

/// Callback type for receiving progress events.
///
/// The CLI implements this with indicatif spinners and bars.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Invoke `callback` with `event` when a callback is installed.
pub(crate) fn emit(callback: Option<&ProgressCallback>, event: ProgressEvent) {
    if let Some(cb) = callback {
        cb(event);
    }
}
