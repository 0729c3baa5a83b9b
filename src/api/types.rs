//! Request and handle types shared by the API client and the pipeline.

use crate::error::SubmissionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generation model offered by the API.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MusicModel {
    /// Cheapest model; the default.
    #[default]
    #[serde(rename = "V3_5")]
    V3_5,
    /// V4.
    #[serde(rename = "V4")]
    V4,
    /// V4.5.
    #[serde(rename = "V4_5")]
    V4_5,
}

impl MusicModel {
    /// Wire identifier sent in the `model` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V3_5 => "V3_5",
            Self::V4 => "V4",
            Self::V4_5 => "V4_5",
        }
    }
}

impl fmt::Display for MusicModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MusicModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('.', "_").as_str() {
            "V3_5" | "CHIRP-V3-5" => Ok(Self::V3_5),
            "V4" => Ok(Self::V4),
            "V4_5" => Ok(Self::V4_5),
            other => Err(format!("unknown model '{other}' (expected V3_5, V4 or V4_5)")),
        }
    }
}

/// How the prompt is interpreted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// The prompt describes the song; the API writes lyrics and title.
    #[default]
    Description,
    /// The prompt is the lyrics; style and title come from the request.
    CustomLyrics,
}

/// An immutable generation request.
///
/// Build with [`GenerationRequest::new`] and the `with_*` methods, then call
/// [`validate`](Self::validate) before submitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
    mode: GenerationMode,
    instrumental: bool,
    title: Option<String>,
    style: Option<String>,
    model: MusicModel,
}

impl GenerationRequest {
    /// Create a description-mode request for the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            mode: GenerationMode::Description,
            instrumental: false,
            title: None,
            style: None,
            model: MusicModel::default(),
        }
    }

    /// Set the prompt interpretation mode.
    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Request an instrumental track.
    pub fn with_instrumental(mut self, instrumental: bool) -> Self {
        self.instrumental = instrumental;
        self
    }

    /// Set the song title (custom mode only).
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the style tags (custom mode only).
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Select the generation model.
    pub fn with_model(mut self, model: MusicModel) -> Self {
        self.model = model;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    pub fn instrumental(&self) -> bool {
        self.instrumental
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn style(&self) -> Option<&str> {
        self.style.as_deref()
    }

    pub fn model(&self) -> MusicModel {
        self.model
    }

    /// Check the request before any network call.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionError::InvalidRequest`] when the prompt is blank,
    /// or when a custom-lyrics request lacks its style or title.
    pub fn validate(&self) -> Result<(), SubmissionError> {
        if self.prompt.trim().is_empty() {
            return Err(SubmissionError::InvalidRequest(
                "prompt must not be empty".to_owned(),
            ));
        }
        if self.mode == GenerationMode::CustomLyrics {
            if self.style.as_deref().is_none_or(|s| s.trim().is_empty()) {
                return Err(SubmissionError::InvalidRequest(
                    "custom lyrics mode requires style tags".to_owned(),
                ));
            }
            if self.title.as_deref().is_none_or(|t| t.trim().is_empty()) {
                return Err(SubmissionError::InvalidRequest(
                    "custom lyrics mode requires a title".to_owned(),
                ));
            }
        }
        Ok(())
    }

    /// Build the JSON body for the generate endpoint.
    pub fn to_json(&self, callback_url: &str) -> serde_json::Value {
        let custom = self.mode == GenerationMode::CustomLyrics;
        let mut body = serde_json::json!({
            "prompt": self.prompt.trim(),
            "customMode": custom,
            "instrumental": self.instrumental,
            "model": self.model.as_str(),
            "callBackUrl": callback_url,
        });

        if custom && let Some(obj) = body.as_object_mut() {
            if let Some(style) = &self.style {
                obj.insert("style".into(), serde_json::json!(style));
            }
            if let Some(title) = &self.title {
                obj.insert("title".into(), serde_json::json!(title));
            }
        }
        body
    }
}

/// Opaque identifier of one asynchronous generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle(String);

impl TaskHandle {
    /// Wrap an identifier returned by the API.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short filename-safe suffix used to disambiguate downloads.
    ///
    /// Falls back to `"task"` when the identifier has no usable characters.
    pub fn suffix(&self) -> String {
        let suffix: String = self
            .0
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(8)
            .collect();
        if suffix.is_empty() {
            "task".to_owned()
        } else {
            suffix
        }
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
