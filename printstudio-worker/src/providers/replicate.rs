/// Replicate prediction client
///
/// # Endpoints
///
/// - `owner/name:version` models: `POST {base}/v1/predictions` with the
///   version id in the body
/// - `owner/name` models: `POST {base}/v1/models/owner/name/predictions`
///   (latest official version)
/// - status: `GET {base}/v1/predictions/{id}`
/// - cancel: `POST {base}/v1/predictions/{id}/cancel`
///
/// The uploaded image is sent inline as a data URL under the tool's image
/// field. Numeric tool parameters are sent as JSON numbers.

use super::{ExternalJob, InferenceProvider, JobRequest, JobStatus, ProviderError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com";

/// Parameters Replicate models expect as integers
const NUMERIC_PARAMS: &[&str] = &["seed", "steps", "num_inference_steps"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: JobStatus,
    #[serde(default)]
    output: Option<JsonValue>,
    #[serde(default)]
    error: Option<JsonValue>,
}

impl From<Prediction> for ExternalJob {
    fn from(prediction: Prediction) -> Self {
        let error = prediction.error.and_then(|e| match e {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s),
            other => Some(other.to_string()),
        });

        ExternalJob {
            id: prediction.id,
            status: prediction.status,
            output: prediction.output.filter(|o| !o.is_null()),
            error,
        }
    }
}

/// Replicate API client
#[derive(Clone)]
pub struct ReplicateProvider {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ReplicateProvider {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, token, base_url))
    }

    pub fn with_client(
        client: reqwest::Client,
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        ReplicateProvider {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Target URL and body for a submission
    fn submission(&self, request: &JobRequest) -> Result<(String, JsonValue), ProviderError> {
        let input = build_input(request);

        match request.model.split_once(':') {
            Some((model, version)) => {
                if model.is_empty() || version.is_empty() {
                    return Err(ProviderError::InvalidRequest(format!(
                        "Malformed model identifier: {}",
                        request.model
                    )));
                }
                Ok((
                    format!("{}/v1/predictions", self.base_url),
                    json!({ "version": version, "input": input }),
                ))
            }
            None => {
                let (owner, name) = request.model.split_once('/').ok_or_else(|| {
                    ProviderError::InvalidRequest(format!(
                        "Model must be owner/name or owner/name:version, got {}",
                        request.model
                    ))
                })?;
                Ok((
                    format!("{}/v1/models/{}/{}/predictions", self.base_url, owner, name),
                    json!({ "input": input }),
                ))
            }
        }
    }

    async fn read_prediction(response: reqwest::Response) -> Result<ExternalJob, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(prediction.into())
    }
}

/// Model input object: tool parameters plus the image data URL
fn build_input(request: &JobRequest) -> JsonValue {
    let mut input = Map::new();

    for (key, value) in &request.params {
        let value = if NUMERIC_PARAMS.contains(&key.as_str()) {
            value
                .parse::<i64>()
                .map(JsonValue::from)
                .unwrap_or_else(|_| JsonValue::String(value.clone()))
        } else {
            JsonValue::String(value.clone())
        };
        input.insert(key.clone(), value);
    }

    input.insert(
        request.image_field.clone(),
        JsonValue::String(request.image.to_data_url()),
    );

    JsonValue::Object(input)
}

/// Extracts `detail` from a Replicate error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(500).collect())
}

#[async_trait]
impl InferenceProvider for ReplicateProvider {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn submit(&self, request: &JobRequest) -> Result<ExternalJob, ProviderError> {
        let (url, body) = self.submission(request)?;

        tracing::debug!(model = %request.model, url = %url, "Submitting prediction");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await?;

        let job = Self::read_prediction(response).await?;
        tracing::info!(job_id = %job.id, model = %request.model, status = %job.status, "Prediction created");
        Ok(job)
    }

    async fn poll(&self, job_id: &str) -> Result<ExternalJob, ProviderError> {
        let response = self
            .client
            .get(format!("{}/v1/predictions/{}", self.base_url, job_id))
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await?;

        Self::read_prediction(response).await
    }

    async fn cancel(&self, job_id: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/predictions/{}/cancel", self.base_url, job_id))
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ImageInput;

    fn provider() -> ReplicateProvider {
        ReplicateProvider::with_client(reqwest::Client::new(), "r8_test", "https://api.example.com/")
    }

    fn request(model: &str) -> JobRequest {
        JobRequest::new(model, "input_image", ImageInput::new(vec![1u8, 2, 3], "image/png"))
            .param("prompt", "make it red")
            .param("seed", "42")
    }

    #[test]
    fn test_versioned_model_uses_predictions_endpoint() {
        let (url, body) = provider().submission(&request("owner/model:abc123")).unwrap();

        assert_eq!(url, "https://api.example.com/v1/predictions");
        assert_eq!(body["version"], "abc123");
        assert_eq!(body["input"]["prompt"], "make it red");
        assert_eq!(body["input"]["input_image"], "data:image/png;base64,AQID");
    }

    #[test]
    fn test_official_model_uses_model_endpoint() {
        let (url, body) = provider().submission(&request("black-forest-labs/flux-kontext-pro")).unwrap();

        assert_eq!(
            url,
            "https://api.example.com/v1/models/black-forest-labs/flux-kontext-pro/predictions"
        );
        assert!(body.get("version").is_none());
    }

    #[test]
    fn test_numeric_params_sent_as_numbers() {
        let input = build_input(&request("a/b"));
        assert_eq!(input["seed"], json!(42));
        assert_eq!(input["prompt"], json!("make it red"));

        let input = build_input(&request("a/b").param("seed", "random"));
        assert_eq!(input["seed"], json!("random"));
    }

    #[test]
    fn test_malformed_model_rejected() {
        assert!(matches!(
            provider().submission(&request("no-slash")),
            Err(ProviderError::InvalidRequest(_))
        ));
        assert!(matches!(
            provider().submission(&request("owner/model:")),
            Err(ProviderError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_prediction_conversion() {
        let prediction: Prediction = serde_json::from_value(json!({
            "id": "p1",
            "status": "starting",
            "output": null,
            "error": null
        }))
        .unwrap();
        let job = ExternalJob::from(prediction);
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.output.is_none());
        assert!(job.error.is_none());

        let prediction: Prediction = serde_json::from_value(json!({
            "id": "p1",
            "status": "failed",
            "error": "CUDA out of memory"
        }))
        .unwrap();
        let job = ExternalJob::from(prediction);
        assert_eq!(job.error.as_deref(), Some("CUDA out of memory"));
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"detail":"Invalid token."}"#), "Invalid token.");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
