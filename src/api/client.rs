//! HTTP client for the music generation API.
//!
//! Three endpoints, all with bearer auth:
//!
//! - `POST /api/v1/generate`: create a task ([`MusicApiClient::submit`])
//! - `GET /api/v1/generate/record-info?taskId=…`: task status
//!   ([`MusicApiClient::query_status`])
//! - `GET /api/v1/generate/credit`: remaining credits
//!   ([`MusicApiClient::credits`])

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::extract::{self, StatusReport};
use super::types::{GenerationRequest, TaskHandle};
use crate::config::ApiConfig;
use crate::error::{ApiError, ConfigError, SubmissionError};
use crate::poll::StatusSource;

const GENERATE_PATH: &str = "/api/v1/generate";
const STATUS_PATH: &str = "/api/v1/generate/record-info";
const CREDITS_PATH: &str = "/api/v1/generate/credit";

/// Client for the generation API.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct MusicApiClient {
    base_url: String,
    api_key: Option<String>,
    callback_url: String,
    user_agent: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for MusicApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicApiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("callback_url", &self.callback_url)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl MusicApiClient {
    /// Create a client with default timeout and callback URL.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let defaults = ApiConfig::default();
        let client = build_http_client(defaults.request_timeout(), &defaults.user_agent);
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            callback_url: defaults.callback_url,
            user_agent: defaults.user_agent,
            client,
        }
    }

    /// Build a client from configuration, resolving the API key.
    ///
    /// # Errors
    ///
    /// Returns an error when the key reference cannot be resolved.
    pub fn from_config(config: &ApiConfig) -> Result<Self, ConfigError> {
        let api_key = config.api_key.resolve()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key,
            callback_url: config.callback_url.clone(),
            user_agent: config.user_agent.clone(),
            client: build_http_client(config.request_timeout(), &config.user_agent),
        })
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_http_client(timeout, &self.user_agent);
        self
    }

    /// Override the callback URL sent with each request.
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Submit a generation request and return its task handle.
    ///
    /// Exactly one network call, never retried.
    ///
    /// # Errors
    ///
    /// See [`SubmissionError`]: invalid request, transport failure, non-2xx,
    /// error envelope, or a body without a task id.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<TaskHandle, SubmissionError> {
        request.validate()?;

        let url = format!("{}{GENERATE_PATH}", self.base_url);
        let body = request.to_json(&self.callback_url);
        info!(model = %request.model(), "submitting generation request");
        debug!("generate payload: {body}");

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;
        debug!(status = status.as_u16(), "generate response: {text}");

        if !status.is_success() {
            return Err(SubmissionError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let (code, message) = extract::extract_envelope(&text);
        if let Some(code) = code
            && code != 200
        {
            return Err(SubmissionError::Rejected {
                code,
                message: message.unwrap_or_else(|| "unknown error".to_owned()),
                body: text,
            });
        }

        let task_id = extract::extract_task_id(&text)
            .ok_or(SubmissionError::MissingTaskId { body: text })?;
        info!(task_id = %task_id, "generation task created");
        Ok(TaskHandle::new(task_id))
    }

    /// Fetch the raw status body for a task.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] or [`ApiError::HttpStatus`]. Bodies
    /// are not interpreted here; see [`extract::classify_status`].
    pub async fn query_status(&self, task: &TaskHandle) -> Result<String, ApiError> {
        let url = format!("{}{STATUS_PATH}", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .query(&[("taskId", task.as_str())])
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        debug!(task_id = %task, "status response: {text}");
        Ok(text)
    }

    /// Fetch and classify the status of a task.
    ///
    /// # Errors
    ///
    /// Same as [`query_status`](Self::query_status).
    pub async fn fetch_status(&self, task: &TaskHandle) -> Result<StatusReport, ApiError> {
        self.query_status(task).await.map(StatusReport::from_body)
    }

    /// Remaining generation credits on the account.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx, an error envelope, or
    /// a body without a numeric `data` field.
    pub async fn credits(&self) -> Result<u64, ApiError> {
        let url = format!("{}{CREDITS_PATH}", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let (code, message) = extract::extract_envelope(&text);
        if let Some(code) = code
            && code != 200
        {
            return Err(ApiError::Malformed {
                message: format!(
                    "credits request rejected (code {code}): {}",
                    message.unwrap_or_default()
                ),
                body: text,
            });
        }

        parse_credits(&text).ok_or_else(|| ApiError::Malformed {
            message: "credits response has no numeric data field".to_owned(),
            body: text,
        })
    }
}

#[async_trait]
impl StatusSource for MusicApiClient {
    async fn query(&self, task: &TaskHandle) -> Result<String, ApiError> {
        self.query_status(task).await
    }
}

fn build_http_client(timeout: Duration, user_agent: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .unwrap_or_else(|e| {
            warn!("HTTP client setup failed, using reqwest defaults: {e}");
            reqwest::Client::default()
        })
}

/// `data` as a number, a numeric string, or an object with `credits`.
fn parse_credits(body: &str) -> Option<u64> {
    let root = extract::parse_body(body)?;
    let data = root.get("data")?;
    let value = data.get("credits").unwrap_or(data);
    match value {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
