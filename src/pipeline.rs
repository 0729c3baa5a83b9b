//! One generation request from prompt to playback.
//!
//! ```text
//! submit ─▶ wait ─▶ resolve ─┬▶ download ─▶ offer files
//!                            └▶ offer stream URLs
//! ```
//!
//! Every stage is a sequential `await`. A [`Pipeline`] holds no mutable
//! state, so several runs may share one value or run side by side.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{GenerationRequest, MusicApiClient, TaskHandle};
use crate::config::MusicConfig;
use crate::error::{ConfigError, MusicError, PlaybackError, Result};
use crate::playback::{PlayableTrack, PlaybackDispatcher, TrackSelector};
use crate::poll::{AbortReason, PartialPolicy, PollSettings, PollStats, Poller, WaitOutcome};
use crate::progress::{self, ProgressCallback, ProgressEvent};
use crate::retrieve::{DownloadedFile, Retriever};
use crate::tracks::{Track, resolve_tracks};

/// How finished tracks are delivered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Download every track, then offer the files.
    #[default]
    Download,
    /// Offer the tracks' URLs as soon as anything is streamable.
    Stream,
}

/// Per-run options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub mode: PipelineMode,
    /// Hand tracks to a player. When false, results are only reported.
    pub play: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Download,
            play: true,
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub task: TaskHandle,
    /// Playable tracks, in API order.
    pub tracks: Vec<Track>,
    /// Files saved in download mode.
    pub downloads: Vec<DownloadedFile>,
    /// Number of players started.
    pub played: usize,
    /// Locators that could not be played because no player was found.
    pub unplayed: Vec<String>,
    pub poll_stats: PollStats,
}

/// Wires the client, poller, retriever and player together.
#[derive(Debug)]
pub struct Pipeline {
    client: MusicApiClient,
    poll: PollSettings,
    retriever: Retriever,
    dispatcher: PlaybackDispatcher,
    wait_for_completion: bool,
}

impl Pipeline {
    pub fn new(client: MusicApiClient, retriever: Retriever, dispatcher: PlaybackDispatcher) -> Self {
        Self {
            client,
            poll: PollSettings::default(),
            retriever,
            dispatcher,
            wait_for_completion: true,
        }
    }

    /// Build every stage from one configuration value.
    ///
    /// # Errors
    ///
    /// Returns an error when the API key reference cannot be resolved.
    pub fn from_config(config: &MusicConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(
            MusicApiClient::from_config(&config.api)?,
            Retriever::from_config(&config.download),
            PlaybackDispatcher::from_config(&config.playback),
        )
        .with_poll_settings(PollSettings::from_config(&config.poll))
        .with_wait_for_completion(config.download.wait_for_completion))
    }

    pub fn with_poll_settings(mut self, settings: PollSettings) -> Self {
        self.poll = settings;
        self
    }

    /// In download mode, wait for final URLs (`true`) or download stream
    /// URLs as soon as they appear (`false`).
    pub fn with_wait_for_completion(mut self, wait: bool) -> Self {
        self.wait_for_completion = wait;
        self
    }

    pub fn client(&self) -> &MusicApiClient {
        &self.client
    }

    /// Submit `request` and carry it through to delivery.
    ///
    /// # Errors
    ///
    /// Submission failure, generation failure, timeout (with the task id),
    /// cancellation, or failed downloads. A missing player is not an error;
    /// see [`PipelineReport::unplayed`].
    pub async fn run(
        &self,
        request: &GenerationRequest,
        options: RunOptions,
        selector: &mut dyn TrackSelector,
        cancel: &CancellationToken,
        callback: Option<&ProgressCallback>,
    ) -> Result<PipelineReport> {
        let task = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(MusicError::UserCancelled),
            task = self.client.submit(request) => task?,
        };
        progress::emit(
            callback,
            ProgressEvent::Submitted {
                task_id: task.as_str().to_owned(),
            },
        );
        self.resume(&task, options, selector, cancel, callback).await
    }

    /// Carry an already submitted task through to delivery.
    ///
    /// # Errors
    ///
    /// As [`run`](Self::run), minus submission.
    pub async fn resume(
        &self,
        task: &TaskHandle,
        options: RunOptions,
        selector: &mut dyn TrackSelector,
        cancel: &CancellationToken,
        callback: Option<&ProgressCallback>,
    ) -> Result<PipelineReport> {
        let policy = match options.mode {
            PipelineMode::Stream => PartialPolicy::SurfacePartial,
            PipelineMode::Download if self.wait_for_completion => PartialPolicy::WaitForComplete,
            PipelineMode::Download => PartialPolicy::SurfacePartial,
        };
        let poller = Poller::new(
            self.client.clone(),
            self.poll.with_partial_policy(policy),
        );

        let (report, poll_stats) = match poller.wait(task, cancel, callback).await {
            WaitOutcome::Ready { report, stats } => (report, stats),
            WaitOutcome::TimedOut {
                task,
                elapsed,
                last_partial,
                ..
            } => {
                let mut unplayed = Vec::new();
                if let Some(partial) = last_partial {
                    let tracks = resolve_tracks(partial.status.tracks(), &task, None);
                    let playable = stream_entries(&tracks);
                    let offered = if options.play && !playable.is_empty() {
                        info!(count = playable.len(), "offering partial tracks before giving up");
                        self.offer(&playable, selector, cancel, callback).await?
                    } else {
                        Offered::NoPlayer
                    };
                    if let Offered::NoPlayer = offered {
                        unplayed = playable.into_iter().map(|entry| entry.locator).collect();
                    }
                }
                return Err(MusicError::TimeoutExceeded {
                    task_id: task.as_str().to_owned(),
                    elapsed_secs: whole_secs(elapsed),
                    unplayed,
                });
            }
            WaitOutcome::Aborted(AbortReason::UserCancelled) => {
                return Err(MusicError::UserCancelled);
            }
            WaitOutcome::Aborted(AbortReason::GenerationFailed { reason, body }) => {
                return Err(MusicError::GenerationFailed {
                    task_id: task.as_str().to_owned(),
                    reason,
                    body,
                });
            }
        };

        let dir = match options.mode {
            PipelineMode::Download => Some(self.retriever.dir()),
            PipelineMode::Stream => None,
        };
        let tracks = resolve_tracks(report.status.tracks(), task, dir);
        if tracks.is_empty() {
            return Err(MusicError::GenerationFailed {
                task_id: task.as_str().to_owned(),
                reason: "task finished without playable tracks".to_owned(),
                body: report.body,
            });
        }
        info!(task_id = %task, count = tracks.len(), "tracks ready");

        let mut out = PipelineReport {
            task: task.clone(),
            tracks,
            downloads: Vec::new(),
            played: 0,
            unplayed: Vec::new(),
            poll_stats,
        };

        let playable = match options.mode {
            PipelineMode::Stream => stream_entries(&out.tracks),
            PipelineMode::Download => {
                let mut failures = Vec::new();
                for track in &out.tracks {
                    let result = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(MusicError::UserCancelled),
                        result = self.retriever.download_track(track, callback) => result,
                    };
                    match result {
                        Ok(file) => out.downloads.push(file),
                        Err(e) => failures.push(e),
                    }
                }

                let playable: Vec<PlayableTrack> = out
                    .downloads
                    .iter()
                    .map(|file| PlayableTrack {
                        track: file.track.clone(),
                        locator: file.path.display().to_string(),
                    })
                    .collect();

                if let Some(first) = failures.into_iter().next() {
                    let failed = out.tracks.len() - out.downloads.len();
                    let total = out.tracks.len();
                    if options.play && !playable.is_empty() {
                        self.deliver(&playable, &mut out, selector, cancel, callback)
                            .await?;
                    }
                    return Err(MusicError::Retrieval {
                        failed,
                        total,
                        first,
                        saved: out.downloads.into_iter().map(|file| file.path).collect(),
                        unplayed: out.unplayed,
                    });
                }
                playable
            }
        };

        if options.play {
            self.deliver(&playable, &mut out, selector, cancel, callback)
                .await?;
        }
        Ok(out)
    }

    async fn deliver(
        &self,
        playable: &[PlayableTrack],
        out: &mut PipelineReport,
        selector: &mut dyn TrackSelector,
        cancel: &CancellationToken,
        callback: Option<&ProgressCallback>,
    ) -> Result<()> {
        match self.offer(playable, selector, cancel, callback).await? {
            Offered::Played(count) => out.played += count,
            Offered::NoPlayer => {
                out.unplayed
                    .extend(playable.iter().map(|entry| entry.locator.clone()));
            }
        }
        Ok(())
    }

    async fn offer(
        &self,
        playable: &[PlayableTrack],
        selector: &mut dyn TrackSelector,
        cancel: &CancellationToken,
        callback: Option<&ProgressCallback>,
    ) -> Result<Offered> {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(MusicError::UserCancelled),
            result = self.dispatcher.offer_tracks(playable, selector, callback) => result,
        };
        match result {
            Ok(count) => Ok(Offered::Played(count)),
            Err(PlaybackError::NoPlayerAvailable { locator }) => {
                warn!(%locator, "no audio player available; install mpv, vlc, mplayer or ffplay");
                Ok(Offered::NoPlayer)
            }
            Err(e) => {
                warn!("playback failed: {e}");
                Ok(Offered::Played(0))
            }
        }
    }
}

enum Offered {
    Played(usize),
    NoPlayer,
}

/// Whole seconds, rounded up so a short budget never reads as `0s`.
fn whole_secs(elapsed: Duration) -> u64 {
    elapsed.as_secs() + u64::from(elapsed.subsec_nanos() > 0)
}

fn stream_entries(tracks: &[Track]) -> Vec<PlayableTrack> {
    tracks
        .iter()
        .filter_map(|track| {
            track.best_url().map(|url| PlayableTrack {
                track: track.clone(),
                locator: url.to_owned(),
            })
        })
        .collect()
}
