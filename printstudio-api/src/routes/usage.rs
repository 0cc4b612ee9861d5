/// Quota endpoints
///
/// ```text
/// GET  /v1/usage          # plan and per-quota usage for the caller
/// POST /v1/usage/check    # {"tool": "color-change"} -> may the caller run it?
/// ```

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use printstudio_shared::{
    auth::middleware::AuthContext,
    quota::{QuotaCheckResult, UsageSummary},
};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CheckRequest {
    #[validate(length(min = 1, max = 100, message = "Tool name must be 1 to 100 characters"))]
    pub tool: String,
}

/// Returns the caller's usage for the current period
pub async fn get_usage(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<UsageSummary>> {
    let summary = state
        .quota
        .summary(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No usage profile for this account".to_string()))?;

    Ok(Json(summary))
}

/// Pre-flight quota check; consumes nothing
pub async fn check_usage(
    State(state): State<AppState>,
    auth: AuthContext,
    body: Result<Json<CheckRequest>, JsonRejection>,
) -> ApiResult<Json<QuotaCheckResult>> {
    let Json(req) = body?;
    req.validate()?;

    let check = state.quota.check_tool(auth.user_id, req.tool.trim()).await?;

    tracing::debug!(
        user_id = %auth.user_id,
        tool = %req.tool,
        allowed = check.allowed,
        "Quota pre-flight check"
    );

    Ok(Json(check))
}
