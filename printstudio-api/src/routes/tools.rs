/// Tool catalog and invocation endpoints
///
/// # Endpoints
///
/// ```text
/// GET  /v1/tools          # catalog, public
/// POST /v1/tools/:tool    # multipart: `image` file plus tool fields
/// ```
///
/// An invocation passes through, in order: tool lookup (404), upload and field
/// validation (400), quota check (429), provider job, result download. Usage
/// is charged only after the result is in hand. Every attempt past validation
/// is recorded as exactly one usage event.
///
/// # Response
///
/// ```json
/// { "success": true, "image": "data:image/png;base64,..." }
/// ```

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use printstudio_shared::{
    auth::middleware::AuthContext,
    models::usage_event::{NewUsageEvent, UsageStatus},
    quota::IncrementOutcome,
    tools::{find_tool, ToolDefinition, TOOLS},
};
use printstudio_worker::{
    output::fetch_output,
    providers::{ImageInput, JobRequest},
};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Multipart field carrying the upload
const IMAGE_FIELD: &str = "image";

#[derive(Debug, Serialize)]
pub struct ToolListResponse {
    pub tools: &'static [ToolDefinition],
}

#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub success: bool,

    /// Result as a data URL
    pub image: String,
}

/// Lists live tools
pub async fn list_tools() -> Json<ToolListResponse> {
    Json(ToolListResponse { tools: TOOLS })
}

/// Parsed multipart form
struct Upload {
    image: Option<(Bytes, String)>,
    fields: HashMap<String, String>,
}

fn too_large(max_bytes: usize) -> ApiError {
    ApiError::BadRequest(format!(
        "Image exceeds the {} MB upload limit",
        max_bytes / (1024 * 1024)
    ))
}

/// Body limit hits surface as the upload size message
fn upload_error(err: MultipartError, max_bytes: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_bytes)
    } else {
        err.into()
    }
}

async fn read_upload(mut multipart: Multipart, max_bytes: usize) -> ApiResult<Upload> {
    let mut upload = Upload {
        image: None,
        fields: HashMap::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e, max_bytes))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == IMAGE_FIELD {
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(|e| upload_error(e, max_bytes))?;
            upload.image = Some((bytes, content_type));
        } else {
            let value = field.text().await.map_err(|e| upload_error(e, max_bytes))?;
            upload.fields.insert(name, value);
        }
    }

    Ok(upload)
}

fn validate_image(image: Option<(Bytes, String)>, max_bytes: usize) -> ApiResult<ImageInput> {
    let (bytes, content_type) =
        image.ok_or_else(|| ApiError::BadRequest("Image file is required".to_string()))?;

    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Image file is empty".to_string()));
    }
    if !content_type.starts_with("image/") {
        return Err(ApiError::BadRequest(format!(
            "Unsupported file type '{}', an image is required",
            content_type
        )));
    }
    if bytes.len() > max_bytes {
        return Err(too_large(max_bytes));
    }

    Ok(ImageInput::new(bytes, content_type))
}

/// Records one usage event; failures are logged only
fn record_event(state: &AppState, event: NewUsageEvent) {
    if let Err(e) = state.events.record(event) {
        tracing::warn!(error = %e, "Usage event rejected");
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

/// Runs a tool on an uploaded image
pub async fn run_tool(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tool_name): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ToolResponse>> {
    let tool = find_tool(&tool_name)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown tool: {}", tool_name)))?;

    let max_bytes = state.config.api.max_upload_bytes;
    let upload = read_upload(multipart?, max_bytes).await?;
    let image = validate_image(upload.image, max_bytes)?;
    let params = tool.build_params(&upload.fields)?;

    let started = Instant::now();
    let user_id = auth.user_id;
    let request_metadata = json!({
        "content_type": image.content_type,
        "image_bytes": image.bytes.len(),
        "fields": params.keys().collect::<Vec<_>>(),
    });
    let event = |status: UsageStatus| {
        NewUsageEvent::new(user_id, tool.name, tool.category, status)
            .request_metadata(request_metadata.clone())
    };

    let check = state.quota.check(user_id, tool.quota_type).await?;
    if !check.allowed {
        let err = ApiError::quota_exceeded(&check);
        record_event(&state, event(UsageStatus::RateLimited).error_message(err.to_string()));
        return Err(err);
    }

    let result = execute(&state, tool, image, params).await;

    match result {
        Ok((data_url, response_metadata)) => {
            match state.quota.increment(user_id, tool.quota_type).await {
                Ok(IncrementOutcome::LimitReached) => tracing::warn!(
                    user_id = %user_id,
                    tool = %tool.name,
                    "Result delivered without charge, limit reached concurrently"
                ),
                Ok(_) => {}
                Err(e) => tracing::error!(
                    user_id = %user_id,
                    tool = %tool.name,
                    error = %e,
                    "Failed to count usage"
                ),
            }

            record_event(
                &state,
                event(UsageStatus::Success)
                    .processing_time_ms(elapsed_ms(started))
                    .response_metadata(response_metadata),
            );

            tracing::info!(
                user_id = %user_id,
                tool = %tool.name,
                elapsed_ms = elapsed_ms(started),
                "Tool invocation succeeded"
            );

            Ok(Json(ToolResponse {
                success: true,
                image: data_url,
            }))
        }
        Err(err) => {
            tracing::error!(
                user_id = %user_id,
                tool = %tool.name,
                error = %err,
                "Tool invocation failed"
            );

            record_event(
                &state,
                event(UsageStatus::Error)
                    .processing_time_ms(elapsed_ms(started))
                    .error_message(err.to_string()),
            );

            Err(err)
        }
    }
}

/// Runs the provider job and downloads its result
///
/// Returns the result as a data URL together with response metadata.
async fn execute(
    state: &AppState,
    tool: &'static ToolDefinition,
    image: ImageInput,
    params: BTreeMap<String, String>,
) -> ApiResult<(String, serde_json::Value)> {
    let provider = state.providers.get(tool.provider).ok_or_else(|| {
        tracing::error!(provider = %tool.provider.as_str(), "Provider credentials not configured");
        ApiError::ProcessingFailed(format!("{} is not configured", tool.provider.as_str()))
    })?;

    let request = JobRequest::for_tool(tool, image, params);

    tracing::debug!(
        tool = %tool.name,
        provider = %provider.name(),
        "Starting provider job"
    );

    let result = state
        .poller
        .with_max_polls(tool.max_polls)
        .spawn(provider, request, tool.output_keys)
        .wait()
        .await?;

    let fetched = fetch_output(&state.http, &result.output_url).await?;

    let metadata = json!({
        "job_id": result.job_id,
        "polls": result.polls,
        "content_type": fetched.content_type,
        "output_bytes": fetched.bytes.len(),
    });

    Ok((fetched.to_data_url(), metadata))
}
