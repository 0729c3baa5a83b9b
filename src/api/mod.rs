//! Remote music generation API: request types, HTTP client, and the
//! response extractor.

pub mod client;
pub mod extract;
pub mod types;

pub use client::MusicApiClient;
pub use extract::{GenerationStatus, RawTrack, StatusReport, classify_status};
pub use types::{GenerationMode, GenerationRequest, MusicModel, TaskHandle};
