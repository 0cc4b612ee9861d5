/// Error handling for the API server
///
/// All handlers return `Result<T, ApiError>`; the error converts into a JSON
/// response:
///
/// ```json
/// { "error": "Image file is required", "code": "bad_request" }
/// ```
///
/// Quota refusals additionally carry `reason`, `current_usage` and `limit`.
///
/// # Example
///
/// ```
/// use printstudio_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::{json, Value};
///
/// async fn handler(name: Option<String>) -> ApiResult<Json<Value>> {
///     let name = name.ok_or_else(|| ApiError::BadRequest("name is required".to_string()))?;
///     Ok(Json(json!({ "name": name })))
/// }
/// ```

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use printstudio_shared::events::EventStoreError;
use printstudio_shared::quota::{QuotaCheckResult, QuotaError};
use printstudio_shared::tools::ToolInputError;
use printstudio_worker::output::FetchError;
use printstudio_worker::poller::JobError;
use printstudio_worker::providers::ProviderError;
use serde::{Deserialize, Serialize};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {} errors", .0.len())]
    ValidationError(Vec<ValidationErrorDetail>),

    /// Usage limit reached (429)
    #[error("Quota exceeded: {reason}")]
    QuotaExceeded {
        reason: String,
        current_usage: u32,
        limit: u32,
    },

    /// Tool invocation failed; the message is shown to the client
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    /// Internal error; the message is logged, never returned
    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,

    /// Machine-readable code (e.g. "bad_request", "quota_exceeded")
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_usage: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ErrorResponse {
    fn new(code: &str, error: String) -> Self {
        ErrorResponse {
            error,
            code: code.to_string(),
            details: None,
            reason: None,
            current_usage: None,
            limit: None,
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ProcessingFailed(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Refusal built from a failed quota check
    pub fn quota_exceeded(check: &QuotaCheckResult) -> Self {
        ApiError::QuotaExceeded {
            reason: check
                .reason
                .clone()
                .unwrap_or_else(|| format!("{} limit reached", check.quota_type.label())),
            current_usage: check.current_usage,
            limit: check.limit,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            ApiError::BadRequest(msg) => ErrorResponse::new("bad_request", msg),
            ApiError::Unauthorized(msg) => ErrorResponse::new("unauthorized", msg),
            ApiError::Forbidden(msg) => ErrorResponse::new("forbidden", msg),
            ApiError::NotFound(msg) => ErrorResponse::new("not_found", msg),
            ApiError::ValidationError(errors) => ErrorResponse {
                details: Some(errors),
                ..ErrorResponse::new("validation_error", "Request validation failed".to_string())
            },
            ApiError::QuotaExceeded {
                reason,
                current_usage,
                limit,
            } => ErrorResponse {
                reason: Some(reason),
                current_usage: Some(current_usage),
                limit: Some(limit),
                ..ErrorResponse::new("quota_exceeded", "Usage limit exceeded".to_string())
            },
            ApiError::ProcessingFailed(msg) => ErrorResponse::new("processing_failed", msg),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                ErrorResponse::new("internal_error", "An internal error occurred".to_string())
            }
            ApiError::ServiceUnavailable(msg) => ErrorResponse::new("service_unavailable", msg),
        };

        (status, Json(body)).into_response()
    }
}

impl From<QuotaError> for ApiError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::LimitExceeded {
                quota_type,
                limit,
                current,
            } => ApiError::quota_exceeded(&QuotaCheckResult::exceeded(quota_type, current, limit)),
            QuotaError::StoreUnavailable(msg) => {
                tracing::error!(error = %msg, "Quota store unavailable");
                ApiError::ServiceUnavailable("Usage tracking is temporarily unavailable".to_string())
            }
            QuotaError::UnknownTool(name) => ApiError::NotFound(format!("Unknown tool: {}", name)),
        }
    }
}

/// Provider failures pass their text through to the client
impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        let message = match &err {
            JobError::Submit(ProviderError::Api { message, .. })
            | JobError::Poll {
                source: ProviderError::Api { message, .. },
                ..
            } => message.clone(),
            JobError::Failed(message) => message.clone(),
            other => other.to_string(),
        };
        ApiError::ProcessingFailed(message)
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        ApiError::ProcessingFailed(format!("Failed to download result: {}", err))
    }
}

impl From<ToolInputError> for ApiError {
    fn from(err: ToolInputError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

// Extractor rejections keep the JSON error body

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<EventStoreError> for ApiError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::Unavailable => {
                ApiError::ServiceUnavailable("Analytics are not available".to_string())
            }
            EventStoreError::Database(e) => ApiError::InternalError(format!("Database error: {}", e)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let errors = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid {}", field)),
                })
            })
            .collect();
        ApiError::ValidationError(errors)
    }
}
