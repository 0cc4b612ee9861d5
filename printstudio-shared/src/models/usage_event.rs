/// Usage event model and analytics queries
///
/// Append-only log of tool invocation attempts. Each attempt produces exactly
/// one event, whether it succeeded, failed, or was refused by the quota guard.
/// The admin analytics endpoints aggregate over this table.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE usage_events (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL,
///     tool_name TEXT NOT NULL,
///     tool_category TEXT NOT NULL,
///     status TEXT NOT NULL CHECK (status IN ('success', 'error', 'rate_limited')),
///     processing_time_ms BIGINT NOT NULL DEFAULT 0,
///     error_message TEXT,
///     request_metadata JSONB,
///     response_metadata JSONB,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::fmt;
use uuid::Uuid;

/// Outcome of a tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Success,
    Error,
    /// Refused by the quota guard
    RateLimited,
}

impl UsageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageStatus::Success => "success",
            UsageStatus::Error => "error",
            UsageStatus::RateLimited => "rate_limited",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(UsageStatus::Success),
            "error" => Some(UsageStatus::Error),
            "rate_limited" => Some(UsageStatus::RateLimited),
            _ => None,
        }
    }
}

impl fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored usage event
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UsageEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tool_name: String,
    pub tool_category: String,
    pub status: String,
    pub processing_time_ms: i64,
    pub error_message: Option<String>,
    pub request_metadata: Option<JsonValue>,
    pub response_metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a usage event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUsageEvent {
    pub user_id: Uuid,
    pub tool_name: String,
    pub tool_category: String,
    pub status: UsageStatus,
    pub processing_time_ms: i64,
    pub error_message: Option<String>,
    pub request_metadata: Option<JsonValue>,
    pub response_metadata: Option<JsonValue>,
}

impl NewUsageEvent {
    pub fn new(
        user_id: Uuid,
        tool_name: impl Into<String>,
        tool_category: impl Into<String>,
        status: UsageStatus,
    ) -> Self {
        NewUsageEvent {
            user_id,
            tool_name: tool_name.into(),
            tool_category: tool_category.into(),
            status,
            processing_time_ms: 0,
            error_message: None,
            request_metadata: None,
            response_metadata: None,
        }
    }

    pub fn processing_time_ms(mut self, millis: i64) -> Self {
        self.processing_time_ms = millis.max(0);
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn request_metadata(mut self, metadata: JsonValue) -> Self {
        self.request_metadata = Some(metadata);
        self
    }

    pub fn response_metadata(mut self, metadata: JsonValue) -> Self {
        self.response_metadata = Some(metadata);
        self
    }

    /// Materializes the stored form (used by in-memory stores)
    pub fn into_event(self, created_at: DateTime<Utc>) -> UsageEvent {
        UsageEvent {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            tool_name: self.tool_name,
            tool_category: self.tool_category,
            status: self.status.as_str().to_string(),
            processing_time_ms: self.processing_time_ms,
            error_message: self.error_message,
            request_metadata: self.request_metadata,
            response_metadata: self.response_metadata,
            created_at,
        }
    }
}

/// Totals over a time window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventSummary {
    pub total_events: i64,
    pub successes: i64,
    pub errors: i64,
    pub rate_limited: i64,
    pub distinct_users: i64,
    pub avg_processing_time_ms: f64,
}

/// Per-tool totals over a time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ToolStats {
    pub tool_name: String,
    pub tool_category: String,
    pub total: i64,
    pub successes: i64,
    pub errors: i64,
    pub avg_processing_time_ms: f64,
}

/// Per-day totals (UTC days)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub total: i64,
    pub errors: i64,
}

impl UsageEvent {
    /// Appends an event
    pub async fn create(pool: &PgPool, data: NewUsageEvent) -> Result<Self, sqlx::Error> {
        let event = sqlx::query_as::<_, UsageEvent>(
            r#"
            INSERT INTO usage_events
                (user_id, tool_name, tool_category, status, processing_time_ms,
                 error_message, request_metadata, response_metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, user_id, tool_name, tool_category, status, processing_time_ms,
                      error_message, request_metadata, response_metadata, created_at
            "#,
        )
        .bind(data.user_id)
        .bind(data.tool_name)
        .bind(data.tool_category)
        .bind(data.status.as_str())
        .bind(data.processing_time_ms)
        .bind(data.error_message)
        .bind(data.request_metadata)
        .bind(data.response_metadata)
        .fetch_one(pool)
        .await?;

        Ok(event)
    }

    /// Totals for events created at or after `since`
    pub async fn summary(pool: &PgPool, since: DateTime<Utc>) -> Result<EventSummary, sqlx::Error> {
        let summary = sqlx::query_as::<_, EventSummary>(
            r#"
            SELECT
                COUNT(*) AS total_events,
                COUNT(*) FILTER (WHERE status = 'success') AS successes,
                COUNT(*) FILTER (WHERE status = 'error') AS errors,
                COUNT(*) FILTER (WHERE status = 'rate_limited') AS rate_limited,
                COUNT(DISTINCT user_id) AS distinct_users,
                COALESCE(AVG(processing_time_ms), 0)::FLOAT8 AS avg_processing_time_ms
            FROM usage_events
            WHERE created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_one(pool)
        .await?;

        Ok(summary)
    }

    /// Per-tool totals, busiest tool first
    pub async fn tool_breakdown(
        pool: &PgPool,
        since: DateTime<Utc>,
    ) -> Result<Vec<ToolStats>, sqlx::Error> {
        let stats = sqlx::query_as::<_, ToolStats>(
            r#"
            SELECT
                tool_name,
                tool_category,
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'success') AS successes,
                COUNT(*) FILTER (WHERE status = 'error') AS errors,
                COALESCE(AVG(processing_time_ms), 0)::FLOAT8 AS avg_processing_time_ms
            FROM usage_events
            WHERE created_at >= $1
            GROUP BY tool_name, tool_category
            ORDER BY total DESC, tool_name ASC
            "#,
        )
        .bind(since)
        .fetch_all(pool)
        .await?;

        Ok(stats)
    }

    /// Per-day totals, oldest day first
    pub async fn daily_counts(
        pool: &PgPool,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyCount>, sqlx::Error> {
        let counts = sqlx::query_as::<_, DailyCount>(
            r#"
            SELECT
                (created_at AT TIME ZONE 'UTC')::DATE AS day,
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'error') AS errors
            FROM usage_events
            WHERE created_at >= $1
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .bind(since)
        .fetch_all(pool)
        .await?;

        Ok(counts)
    }
}
