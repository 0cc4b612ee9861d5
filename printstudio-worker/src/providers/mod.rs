/// Inference providers
///
/// A provider accepts a job, reports its status and, when it supports it,
/// cancels it. The poller drives providers exclusively through the
/// [`InferenceProvider`] trait.
///
/// # Provider Types
///
/// - **Replicate**: asynchronous predictions, polled until terminal
/// - **OpenAI**: synchronous image edits; `submit` returns a finished job
/// - **Mock**: scripted statuses for tests
///
/// # Job Lifecycle
///
/// ```text
/// submit ──> queued ──> processing ──> succeeded
///               │            │
///               └────────────┴──────> failed / canceled
/// ```

pub mod mock;
pub mod openai;
pub mod replicate;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use printstudio_shared::tools::{ProviderKind, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use mock::MockProvider;
pub use openai::OpenAiImageProvider;
pub use replicate::ReplicateProvider;

/// Provider error types
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with an error status
    #[error("Provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Request rejected before it was sent
    #[error("Invalid job request: {0}")]
    InvalidRequest(String),
}

/// Job status as reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "starting")]
    Queued,
    Processing,
    Succeeded,
    Failed,
    #[serde(alias = "cancelled")]
    Canceled,
}

impl JobStatus {
    /// Whether polling can stop
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a provider job
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalJob {
    /// Provider-assigned id
    pub id: String,
    pub status: JobStatus,

    /// Raw output payload, present once succeeded
    pub output: Option<JsonValue>,

    /// Provider error message
    pub error: Option<String>,
}

impl ExternalJob {
    pub fn new(id: impl Into<String>, status: JobStatus) -> Self {
        ExternalJob {
            id: id.into(),
            status,
            output: None,
            error: None,
        }
    }

    pub fn with_output(mut self, output: JsonValue) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Uploaded image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub bytes: Bytes,
    pub content_type: String,
}

impl ImageInput {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        ImageInput {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// `data:<mime>;base64,<payload>` form, as accepted by Replicate inputs
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            STANDARD.encode(&self.bytes)
        )
    }

    /// File extension for multipart uploads
    pub fn file_extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

/// Everything a provider needs to start a job
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Provider model identifier
    pub model: String,

    /// Input field that receives the image
    pub image_field: String,

    pub image: ImageInput,

    /// Tool parameters (prompt, target color, ...)
    pub params: BTreeMap<String, String>,
}

impl JobRequest {
    pub fn new(model: impl Into<String>, image_field: impl Into<String>, image: ImageInput) -> Self {
        JobRequest {
            model: model.into(),
            image_field: image_field.into(),
            image,
            params: BTreeMap::new(),
        }
    }

    /// Request for a catalog tool
    pub fn for_tool(tool: &ToolDefinition, image: ImageInput, params: BTreeMap<String, String>) -> Self {
        JobRequest {
            model: tool.model.to_string(),
            image_field: tool.image_field.to_string(),
            image,
            params,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Third-party inference backend
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Starts a job. Called exactly once per invocation; never retried.
    async fn submit(&self, request: &JobRequest) -> Result<ExternalJob, ProviderError>;

    /// Fetches the current state of a job
    async fn poll(&self, job_id: &str) -> Result<ExternalJob, ProviderError>;

    /// Asks the provider to stop a job
    ///
    /// Default implementation does nothing, for providers whose jobs finish
    /// inside `submit`.
    async fn cancel(&self, _job_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Configured providers by kind
#[derive(Clone, Default)]
pub struct ProviderSet {
    replicate: Option<Arc<dyn InferenceProvider>>,
    openai: Option<Arc<dyn InferenceProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replicate(mut self, provider: Arc<dyn InferenceProvider>) -> Self {
        self.replicate = Some(provider);
        self
    }

    pub fn with_openai(mut self, provider: Arc<dyn InferenceProvider>) -> Self {
        self.openai = Some(provider);
        self
    }

    /// Provider for a kind, `None` when its credential is not configured
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn InferenceProvider>> {
        match kind {
            ProviderKind::Replicate => self.replicate.clone(),
            ProviderKind::OpenAi => self.openai.clone(),
        }
    }
}
