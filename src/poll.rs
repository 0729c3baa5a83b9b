//! Bounded, cancellable wait for a generation task.
//!
//! The [`Poller`] queries a [`StatusSource`] once per tick, classifies every
//! body with [`classify_status`](crate::api::extract::classify_status), and
//! stops on the first terminal state:
//!
//! ```text
//! Waiting ──Complete──────────────────▶ Ready
//!    │    ──Partial (SurfacePartial)──▶ Ready
//!    │    ──Failed────────────────────▶ Aborted(GenerationFailed)
//!    │    ──cancel────────────────────▶ Aborted(UserCancelled)
//!    │    ──budget spent──────────────▶ TimedOut
//!    └─Pending / Unknown / fault──▶ Waiting
//! ```
//!
//! Transport and HTTP errors during a tick never escape; they are logged
//! and counted in [`PollStats::transient_faults`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::extract::{GenerationStatus, StatusReport};
use crate::api::TaskHandle;
use crate::config::PollConfig;
use crate::error::ApiError;
use crate::progress::{self, ProgressCallback, ProgressEvent};

/// Anything that can answer "what is the status of this task".
///
/// Implemented by [`MusicApiClient`](crate::api::MusicApiClient).
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch the raw status body for `task`.
    async fn query(&self, task: &TaskHandle) -> Result<String, ApiError>;
}

/// What to do when some tracks are playable but not all are final.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PartialPolicy {
    /// Keep waiting for final URLs (download flows).
    #[default]
    WaitForComplete,
    /// Return as soon as anything is playable (streaming flows).
    SurfacePartial,
}

/// Timing parameters for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Target time between the starts of consecutive ticks.
    pub interval: Duration,
    /// Total budget, measured from the start of the wait.
    pub max_wait: Duration,
    /// Pause before the first query.
    pub initial_delay: Duration,
    pub partial_policy: PartialPolicy,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_config(&PollConfig::default())
    }
}

impl PollSettings {
    pub fn from_config(config: &PollConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            max_wait: Duration::from_secs(config.max_wait_secs),
            initial_delay: Duration::from_secs(config.initial_delay_secs),
            partial_policy: PartialPolicy::default(),
        }
    }

    pub fn with_partial_policy(mut self, policy: PartialPolicy) -> Self {
        self.partial_policy = policy;
        self
    }
}

/// Counters collected over one wait.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    /// Status queries issued.
    pub ticks: u32,
    /// Ticks whose query failed at the transport or HTTP level.
    pub transient_faults: u32,
}

/// Why a wait stopped without a result.
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// The cancellation token fired.
    UserCancelled,
    /// The API reported a failure state.
    GenerationFailed {
        reason: String,
        /// Raw status body for diagnostics.
        body: String,
    },
}

/// Terminal result of [`Poller::wait`].
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// Tracks are available.
    Ready { report: StatusReport, stats: PollStats },
    /// The budget ran out. The task may still finish server-side.
    TimedOut {
        task: TaskHandle,
        elapsed: Duration,
        stats: PollStats,
        /// Most recent partial report, when one was seen.
        last_partial: Option<StatusReport>,
    },
    Aborted(AbortReason),
}

impl WaitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Drives the wait loop for one task.
pub struct Poller<S> {
    source: S,
    settings: PollSettings,
}

impl<S: StatusSource> Poller<S> {
    pub fn new(source: S, settings: PollSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Wait for `task` to reach a terminal state.
    ///
    /// Never queries after returning. Cancellation interrupts both the
    /// inter-tick sleep and an in-flight query.
    pub async fn wait(
        &self,
        task: &TaskHandle,
        cancel: &CancellationToken,
        callback: Option<&ProgressCallback>,
    ) -> WaitOutcome {
        let settings = self.settings;
        let started = Instant::now();
        let mut stats = PollStats::default();
        let mut last_partial: Option<StatusReport> = None;

        info!(
            task_id = %task,
            interval_secs = settings.interval.as_secs_f64(),
            max_wait_secs = settings.max_wait.as_secs_f64(),
            "waiting for generation"
        );

        if !settings.initial_delay.is_zero() {
            let delay = settings.initial_delay.min(settings.max_wait);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return cancelled(task),
                () = tokio::time::sleep(delay) => {}
            }
        }

        loop {
            if cancel.is_cancelled() {
                return cancelled(task);
            }

            let tick_started = Instant::now();
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return cancelled(task),
                result = self.source.query(task) => result,
            };
            stats.ticks += 1;

            let status = match result {
                Ok(body) => {
                    let report = StatusReport::from_body(body);
                    debug!(
                        task_id = %task,
                        tick = stats.ticks,
                        api_status = ?report.api_status(),
                        status = report.status.label(),
                        "status tick"
                    );
                    Some(report)
                }
                Err(e) => {
                    stats.transient_faults += 1;
                    warn!(task_id = %task, tick = stats.ticks, "status query failed: {e}");
                    None
                }
            };

            progress::emit(
                callback,
                ProgressEvent::PollTick {
                    task_id: task.as_str().to_owned(),
                    tick: stats.ticks,
                    elapsed_secs: started.elapsed().as_secs_f64(),
                    status: status
                        .as_ref()
                        .map_or("unknown", |r| r.status.label())
                        .to_owned(),
                },
            );

            if let Some(report) = status {
                match &report.status {
                    GenerationStatus::Complete(_) => {
                        info!(task_id = %task, ticks = stats.ticks, "generation complete");
                        return WaitOutcome::Ready { report, stats };
                    }
                    GenerationStatus::Partial(_)
                        if settings.partial_policy == PartialPolicy::SurfacePartial =>
                    {
                        info!(task_id = %task, ticks = stats.ticks, "streamable tracks available");
                        return WaitOutcome::Ready { report, stats };
                    }
                    GenerationStatus::Partial(_) => last_partial = Some(report),
                    GenerationStatus::Failed { reason } => {
                        warn!(task_id = %task, "generation failed: {reason}");
                        return WaitOutcome::Aborted(AbortReason::GenerationFailed {
                            reason: reason.clone(),
                            body: report.body,
                        });
                    }
                    GenerationStatus::Pending | GenerationStatus::Unknown => {}
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= settings.max_wait {
                warn!(
                    task_id = %task,
                    elapsed_secs = elapsed.as_secs_f64(),
                    ticks = stats.ticks,
                    "wait budget exhausted"
                );
                return WaitOutcome::TimedOut {
                    task: task.clone(),
                    elapsed,
                    stats,
                    last_partial,
                };
            }

            let remaining = settings.max_wait - elapsed;
            let pause = settings
                .interval
                .saturating_sub(tick_started.elapsed())
                .min(remaining);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return cancelled(task),
                () = tokio::time::sleep(pause) => {}
            }
        }
    }
}

fn cancelled(task: &TaskHandle) -> WaitOutcome {
    info!(task_id = %task, "wait cancelled");
    WaitOutcome::Aborted(AbortReason::UserCancelled)
}
