/// Admin usage analytics
///
/// All endpoints take an optional `days` query parameter (1 to 365, default
/// 30) selecting the trailing window. Access is limited to `ADMIN_USER_IDS`
/// by the router.
///
/// ```text
/// GET /v1/admin/analytics/summary?days=7
/// GET /v1/admin/analytics/tools?days=7
/// GET /v1/admin/analytics/daily?days=7
/// ```

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use printstudio_shared::{
    events::UsageEventStore,
    models::usage_event::{DailyCount, EventSummary, ToolStats},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub const DEFAULT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct AnalyticsQuery {
    #[validate(range(min = 1, max = 365, message = "days must be between 1 and 365"))]
    pub days: Option<i64>,
}

impl AnalyticsQuery {
    fn window(&self) -> ApiResult<(i64, DateTime<Utc>)> {
        self.validate()?;
        let days = self.days.unwrap_or(DEFAULT_WINDOW_DAYS);
        Ok((days, Utc::now() - Duration::days(days)))
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse<T> {
    pub days: i64,
    pub since: DateTime<Utc>,
    pub data: T,
}

fn event_store(state: &AppState) -> ApiResult<Arc<dyn UsageEventStore>> {
    state
        .events
        .store()
        .cloned()
        .ok_or_else(|| ApiError::ServiceUnavailable("Analytics require a database".to_string()))
}

pub async fn analytics_summary(
    State(state): State<AppState>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> ApiResult<Json<AnalyticsResponse<EventSummary>>> {
    let (days, since) = query?.window()?;
    let data = event_store(&state)?.summary(since).await?;

    Ok(Json(AnalyticsResponse { days, since, data }))
}

pub async fn analytics_tools(
    State(state): State<AppState>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> ApiResult<Json<AnalyticsResponse<Vec<ToolStats>>>> {
    let (days, since) = query?.window()?;
    let data = event_store(&state)?.tool_breakdown(since).await?;

    Ok(Json(AnalyticsResponse { days, since, data }))
}

pub async fn analytics_daily(
    State(state): State<AppState>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> ApiResult<Json<AnalyticsResponse<Vec<DailyCount>>>> {
    let (days, since) = query?.window()?;
    let data = event_store(&state)?.daily_counts(since).await?;

    Ok(Json(AnalyticsResponse { days, since, data }))
}
