/// OpenAI image edit client
///
/// `POST {base}/v1/images/edits` is synchronous: the finished image comes
/// back in the submission response, so `submit` returns a job that is
/// already `succeeded` and the poller never polls it.
///
/// The output is shaped as `{"image": <url>}` where the URL is a data URL
/// built from `b64_json`, or the hosted `url` when the API returns one.

use super::{ExternalJob, InferenceProvider, JobRequest, JobStatus, ProviderError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Image edits routinely take longer than a minute
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// OpenAI Images API client
#[derive(Clone)]
pub struct OpenAiImageProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiImageProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, api_key, base_url))
    }

    pub fn with_client(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        OpenAiImageProvider {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn form(request: &JobRequest) -> Result<Form, ProviderError> {
        let prompt = request
            .params
            .get("prompt")
            .ok_or_else(|| ProviderError::InvalidRequest("prompt is required".to_string()))?;

        let image = Part::bytes(request.image.bytes.to_vec())
            .file_name(format!("image.{}", request.image.file_extension()))
            .mime_str(&request.image.content_type)?;

        let mut form = Form::new()
            .text("model", request.model.clone())
            .text("prompt", prompt.clone())
            .part(request.image_field.clone(), image);

        if let Some(size) = request.params.get("size") {
            form = form.text("size", size.clone());
        }

        Ok(form)
    }
}

/// Converts the first returned image into job output
fn output_from_response(response: ImagesResponse) -> Result<JsonValue, ProviderError> {
    let first = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("no image in response".to_string()))?;

    let url = match (first.b64_json, first.url) {
        (Some(b64), _) if !b64.is_empty() => format!("data:image/png;base64,{}", b64),
        (_, Some(url)) if !url.is_empty() => url,
        _ => {
            return Err(ProviderError::InvalidResponse(
                "image entry has neither b64_json nor url".to_string(),
            ))
        }
    };

    Ok(json!({ "image": url }))
}

#[async_trait]
impl InferenceProvider for OpenAiImageProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn submit(&self, request: &JobRequest) -> Result<ExternalJob, ProviderError> {
        let form = Self::form(request)?;

        tracing::debug!(model = %request.model, "Submitting image edit");

        let response = self
            .client
            .post(format!("{}/v1/images/edits", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<JsonValue>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(body);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ImagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let output = output_from_response(body)?;
        let job = ExternalJob::new(format!("openai-{}", Uuid::new_v4()), JobStatus::Succeeded)
            .with_output(output);

        tracing::info!(job_id = %job.id, model = %request.model, "Image edit completed");
        Ok(job)
    }

    async fn poll(&self, job_id: &str) -> Result<ExternalJob, ProviderError> {
        Err(ProviderError::InvalidRequest(format!(
            "image edits are synchronous, job {} cannot be polled",
            job_id
        )))
    }
}
