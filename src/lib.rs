//! voice2music: text-to-music generation with local playback.
//!
//! A prompt goes to a remote music generation API; the resulting tracks are
//! downloaded and/or streamed to an external audio player:
//! Prompt → Submit → Poll → Resolve tracks → Download → Play
//!
//! # Architecture
//!
//! - **API** ([`api`]): request types, the HTTP client and a tolerant
//!   extractor that classifies every status response shape
//! - **Poll** ([`poll`]): a bounded, cancellable wait state machine
//! - **Tracks** ([`tracks`]): titles and collision-free file names
//! - **Retrieve** ([`retrieve`]): time-bounded streamed downloads
//! - **Playback** ([`playback`]): ordered player probes and track selection
//! - **Pipeline** ([`pipeline`]): wires the stages together for one request

pub mod api;
pub mod app_dirs;
pub mod config;
pub mod credentials;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod poll;
pub mod progress;
pub mod retrieve;
pub mod tracks;

pub use api::{GenerationMode, GenerationRequest, MusicApiClient, MusicModel, TaskHandle};
pub use config::MusicConfig;
pub use error::{MusicError, Result};
pub use pipeline::{Pipeline, PipelineMode, PipelineReport, RunOptions};
pub use progress::{ProgressCallback, ProgressEvent};
