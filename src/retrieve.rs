//! Downloading rendered tracks to the local download directory.
//!
//! Bytes are streamed into `<stem>.mp3.part` and renamed into place only
//! after the whole body arrived, so a failed or interrupted download never
//! leaves a truncated `.mp3` behind.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::error::RetrievalError;
use crate::progress::{self, ProgressCallback, ProgressEvent};
use crate::tracks::{AUDIO_EXTENSION, Track};

const MAX_REDIRECTS: usize = 10;

/// A track saved to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedFile {
    /// Final path of the audio file.
    pub path: PathBuf,
    /// URL it was fetched from.
    pub url: String,
    pub bytes: u64,
    /// Track the file belongs to.
    pub track: Track,
}

/// Streams audio files into a directory with a per-file time budget.
#[derive(Debug, Clone)]
pub struct Retriever {
    client: reqwest::Client,
    dir: PathBuf,
    budget: Duration,
}

impl Retriever {
    pub fn new(dir: impl Into<PathBuf>, budget: Duration) -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("voice2music/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("download client setup failed, using reqwest defaults: {e}");
                reqwest::Client::default()
            });
        Self {
            client,
            dir: dir.into(),
            budget,
        }
    }

    pub fn from_config(config: &DownloadConfig) -> Self {
        Self::new(&config.dir, Duration::from_secs(config.timeout_secs))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download `track` from its final URL, or its stream URL when no final
    /// URL is known, into `<dir>/<file_stem>.mp3`.
    ///
    /// # Errors
    ///
    /// [`RetrievalError::NoUrl`] when the track has no URL at all, otherwise
    /// as [`download`](Self::download).
    pub async fn download_track(
        &self,
        track: &Track,
        callback: Option<&ProgressCallback>,
    ) -> Result<DownloadedFile, RetrievalError> {
        let url = track
            .best_url()
            .ok_or_else(|| RetrievalError::NoUrl(track.title.clone()))?;
        if track.final_url.is_none() {
            debug!(title = %track.title, "no final URL; downloading the stream");
        }
        self.download(track, url, &track.file_stem, callback).await
    }

    /// Download `url` into `<dir>/<stem>.mp3`.
    ///
    /// The directory is created when missing. On any failure the partial
    /// file is removed and nothing exists at the target path.
    ///
    /// # Errors
    ///
    /// Timeout, transport failure, non-2xx status, or local I/O error.
    pub async fn download(
        &self,
        track: &Track,
        url: &str,
        stem: &str,
        callback: Option<&ProgressCallback>,
    ) -> Result<DownloadedFile, RetrievalError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let dest = self.dir.join(format!("{stem}.{AUDIO_EXTENSION}"));
        let part = self.dir.join(format!("{stem}.{AUDIO_EXTENSION}.part"));

        info!(title = %track.title, url, path = %dest.display(), "downloading track");

        let mut guard = PartFile::new(part);
        let outcome = tokio::time::timeout(
            self.budget,
            self.fetch_to(url, guard.path(), &track.title, &dest, callback),
        )
        .await;

        let bytes = match outcome {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(title = %track.title, "download failed: {e}");
                return Err(e);
            }
            Err(_) => {
                warn!(title = %track.title, budget_secs = self.budget.as_secs(), "download timed out");
                return Err(RetrievalError::Timeout {
                    url: url.to_owned(),
                    secs: self.budget.as_secs(),
                });
            }
        };

        tokio::fs::rename(guard.path(), &dest).await?;
        guard.disarm();

        progress::emit(
            callback,
            ProgressEvent::DownloadComplete {
                title: track.title.clone(),
                path: dest.clone(),
                bytes,
            },
        );
        info!(path = %dest.display(), bytes, "download complete");

        Ok(DownloadedFile {
            path: dest,
            url: url.to_owned(),
            bytes,
            track: track.clone(),
        })
    }

    async fn fetch_to(
        &self,
        url: &str,
        part: &Path,
        title: &str,
        dest: &Path,
        callback: Option<&ProgressCallback>,
    ) -> Result<u64, RetrievalError> {
        let transport = |e: reqwest::Error| RetrievalError::Transport {
            url: url.to_owned(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::HttpStatus {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();
        progress::emit(
            callback,
            ProgressEvent::DownloadStarted {
                title: title.to_owned(),
                path: dest.to_path_buf(),
                total_bytes,
            },
        );

        let mut file = tokio::fs::File::create(part).await?;
        let mut stream = response.bytes_stream();
        let mut bytes_downloaded: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport)?;
            file.write_all(&chunk).await?;
            bytes_downloaded += chunk.len() as u64;
            progress::emit(
                callback,
                ProgressEvent::DownloadProgress {
                    title: title.to_owned(),
                    bytes_downloaded,
                    total_bytes,
                },
            );
        }
        file.flush().await?;
        Ok(bytes_downloaded)
    }
}

/// A `.part` file that is deleted on drop unless disarmed.
///
/// Covers error returns, timeouts, and the download future being dropped
/// on cancellation.
struct PartFile {
    path: PathBuf,
    armed: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed partial download"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "could not remove partial download: {e}"),
        }
    }
}
