//! Tolerant extraction of fields from raw API responses.
//!
//! The status endpoint returns different shapes while a task is streaming
//! and once it is final, and older endpoints return a bare track list. All
//! of that tolerance lives here: callers get typed values or "absent", never
//! an error.
//!
//! # Absence
//!
//! A field is absent when the key is missing, when its value is JSON `null`,
//! when it is the literal string `"null"`, or when it is an empty string.
//! Unparseable bodies make every field absent and classify as
//! [`GenerationStatus::Unknown`].

use serde_json::Value;

/// API `data.status` values that mean the task will never produce audio.
const FAILURE_STATUSES: &[&str] = &[
    "FAILED",
    "CREATE_TASK_FAILED",
    "GENERATE_AUDIO_FAILED",
    "CALLBACK_EXCEPTION",
    "SENSITIVE_WORD_ERROR",
];

/// API `data.status` value for a fully rendered task.
const SUCCESS_STATUS: &str = "SUCCESS";

/// One track as it appears in a status payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTrack {
    /// API track identifier.
    pub id: Option<String>,
    /// Title chosen by the API (or the request).
    pub title: Option<String>,
    /// Playable location available while rendering.
    pub stream_url: Option<String>,
    /// Fully rendered download location.
    pub final_url: Option<String>,
    /// Style tags.
    pub tags: Option<String>,
    /// Duration in seconds.
    pub duration: Option<f64>,
}

impl RawTrack {
    /// A track is playable once it has a stream or a final URL.
    pub fn is_playable(&self) -> bool {
        self.stream_url.is_some() || self.final_url.is_some()
    }

    fn from_object(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let text = |keys: &[&str]| keys.iter().find_map(|k| value.get(*k).and_then(value_text));
        Some(Self {
            id: text(&["id", "clipId"]),
            title: text(&["title"]),
            stream_url: text(&["streamAudioUrl", "stream_audio_url"]),
            final_url: text(&["audioUrl", "audio_url"]),
            tags: text(&["tags"]),
            duration: value.get("duration").and_then(value_number),
        })
    }
}

/// Classification of one status response.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationStatus {
    /// Accepted but no audio yet.
    Pending,
    /// Some tracks are playable; rendering continues.
    Partial(Vec<RawTrack>),
    /// Rendering finished.
    Complete(Vec<RawTrack>),
    /// The API reports the task failed.
    Failed {
        /// Reason stated by the API.
        reason: String,
    },
    /// Malformed, empty or error-enveloped response.
    Unknown,
}

impl GenerationStatus {
    /// Short label for logs and progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial(_) => "partial",
            Self::Complete(_) => "complete",
            Self::Failed { .. } => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Tracks carried by a partial or complete status.
    pub fn tracks(&self) -> &[RawTrack] {
        match self {
            Self::Partial(tracks) | Self::Complete(tracks) => tracks,
            _ => &[],
        }
    }
}

/// A classified status together with the body it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    /// Classification.
    pub status: GenerationStatus,
    /// Raw response body, kept for diagnostics.
    pub body: String,
}

impl StatusReport {
    /// Classify `body` and keep it.
    pub fn from_body(body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            status: classify_status(&body),
            body,
        }
    }

    /// The `data.status` string reported by the API, if any.
    pub fn api_status(&self) -> Option<String> {
        parse_body(&self.body)
            .as_ref()
            .and_then(|v| v.get("data"))
            .and_then(|d| d.get("status"))
            .and_then(value_text)
    }
}

/// Parse a body into JSON, or `None` when it is not valid JSON.
pub fn parse_body(body: &str) -> Option<Value> {
    serde_json::from_str(body).ok()
}

/// First present occurrence of `name`, searching the whole document.
///
/// Objects are searched key-first, then depth first; arrays in order.
pub fn extract_field(body: &str, name: &str) -> Option<String> {
    let root = parse_body(body)?;
    find_first(&root, name)
}

/// Every present occurrence of `name`.
///
/// Array elements are visited in order, so one key per track comes back in
/// the order the API listed the tracks. Keys within one object are visited
/// in sorted key order, not the order they appear in the body.
pub fn extract_all(body: &str, name: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(root) = parse_body(body) {
        collect_all(&root, name, &mut out);
    }
    out
}

/// Task identifier from a submission response.
///
/// Looks at `data.taskId`, `data.task_id`, then top-level `taskId`/`task_id`.
pub fn extract_task_id(body: &str) -> Option<String> {
    let root = parse_body(body)?;
    let data = root.get("data");
    ["taskId", "task_id"]
        .iter()
        .find_map(|k| data.and_then(|d| d.get(*k)).and_then(value_text))
        .or_else(|| {
            ["taskId", "task_id"]
                .iter()
                .find_map(|k| root.get(*k).and_then(value_text))
        })
}

/// Envelope `code` and `msg`, when present.
pub fn extract_envelope(body: &str) -> (Option<i64>, Option<String>) {
    let Some(root) = parse_body(body) else {
        return (None, None);
    };
    let code = root.get("code").and_then(value_number).map(|c| c as i64);
    let msg = root.get("msg").and_then(value_text);
    (code, msg)
}

/// All tracks in a status payload, in API order.
///
/// Recognised shapes, first match wins:
/// 1. a `sunoData` array anywhere in the document (record-info responses),
/// 2. `data.data[]` or `data[]` (legacy details responses),
/// 3. `data` itself as a single track carrying a URL field.
pub fn extract_tracks(root: &Value) -> Vec<RawTrack> {
    if let Some(list) = find_first_value(root, "sunoData").and_then(Value::as_array) {
        return list.iter().filter_map(RawTrack::from_object).collect();
    }

    let data = root.get("data");
    let nested = data.and_then(|d| d.get("data")).and_then(Value::as_array);
    if let Some(list) = nested.or_else(|| data.and_then(Value::as_array)) {
        return list.iter().filter_map(RawTrack::from_object).collect();
    }

    if let Some(single) = data.and_then(RawTrack::from_object)
        && single.is_playable()
    {
        return vec![single];
    }
    Vec::new()
}

/// Classify a status response. Never fails.
pub fn classify_status(body: &str) -> GenerationStatus {
    let Some(root) = parse_body(body) else {
        return GenerationStatus::Unknown;
    };
    if !root.is_object() {
        return GenerationStatus::Unknown;
    }
    if let Some(code) = root.get("code")
        && value_number(code) != Some(200.0)
    {
        return GenerationStatus::Unknown;
    }
    let Some(data) = root.get("data").filter(|d| !d.is_null()) else {
        return GenerationStatus::Unknown;
    };

    let status = data
        .get("status")
        .and_then(value_text)
        .map(|s| s.to_ascii_uppercase());
    let error_message = ["errorMessage", "error_message", "error"]
        .iter()
        .find_map(|k| data.get(*k).and_then(value_text));

    let tracks = extract_tracks(&root);
    let any_playable = tracks.iter().any(RawTrack::is_playable);

    let failed_by_status = status
        .as_deref()
        .is_some_and(|s| FAILURE_STATUSES.contains(&s));
    let failed_by_message = status.is_none() && error_message.is_some() && !any_playable;
    if failed_by_status || failed_by_message {
        let reason = error_message
            .or_else(|| root.get("msg").and_then(value_text))
            .or(status)
            .unwrap_or_else(|| "unknown error".to_owned());
        return GenerationStatus::Failed { reason };
    }

    match status.as_deref() {
        Some(SUCCESS_STATUS) if any_playable => GenerationStatus::Complete(tracks),
        Some(SUCCESS_STATUS) => GenerationStatus::Unknown,
        None if !tracks.is_empty() && tracks.iter().all(|t| t.final_url.is_some()) => {
            GenerationStatus::Complete(tracks)
        }
        _ if any_playable => GenerationStatus::Partial(tracks),
        _ => GenerationStatus::Pending,
    }
}

// ── Helpers ────────────────────────────────────────────────────

/// Text of a present scalar value.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("null") {
                None
            } else {
                Some(s.to_owned())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Numeric value of a number or numeric string.
fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn find_first(value: &Value, name: &str) -> Option<String> {
    match value {
        Value::Object(map) => map
            .get(name)
            .and_then(value_text)
            .or_else(|| map.values().find_map(|v| find_first(v, name))),
        Value::Array(items) => items.iter().find_map(|v| find_first(v, name)),
        _ => None,
    }
}

fn find_first_value<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map
            .get(name)
            .filter(|v| !v.is_null())
            .or_else(|| map.values().find_map(|v| find_first_value(v, name))),
        Value::Array(items) => items.iter().find_map(|v| find_first_value(v, name)),
        _ => None,
    }
}

fn collect_all(value: &Value, name: &str, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == name {
                    if let Some(text) = value_text(child) {
                        out.push(text);
                    }
                } else {
                    collect_all(child, name, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_all(item, name, out);
            }
        }
        _ => {}
    }
}
