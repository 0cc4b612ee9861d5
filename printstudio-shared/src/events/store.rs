//! Usage event stores
//!
//! Insert plus the three analytics aggregations. The Postgres store pushes the
//! aggregation into SQL; the in-memory store computes the same figures over
//! its vector so handler tests see identical shapes.

use crate::models::usage_event::{
    DailyCount, EventSummary, NewUsageEvent, ToolStats, UsageEvent, UsageStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Event store unavailable")]
    Unavailable,
}

/// Append-only usage event log with analytics reads
#[async_trait]
pub trait UsageEventStore: Send + Sync {
    async fn insert(&self, event: NewUsageEvent) -> Result<UsageEvent, EventStoreError>;

    async fn summary(&self, since: DateTime<Utc>) -> Result<EventSummary, EventStoreError>;

    /// Per-tool totals, busiest first
    async fn tool_breakdown(&self, since: DateTime<Utc>) -> Result<Vec<ToolStats>, EventStoreError>;

    /// Per-UTC-day totals, oldest first
    async fn daily_counts(&self, since: DateTime<Utc>) -> Result<Vec<DailyCount>, EventStoreError>;
}

#[derive(Clone)]
pub struct PgUsageEventStore {
    db: PgPool,
}

impl PgUsageEventStore {
    pub fn new(db: PgPool) -> Self {
        PgUsageEventStore { db }
    }
}

#[async_trait]
impl UsageEventStore for PgUsageEventStore {
    async fn insert(&self, event: NewUsageEvent) -> Result<UsageEvent, EventStoreError> {
        Ok(UsageEvent::create(&self.db, event).await?)
    }

    async fn summary(&self, since: DateTime<Utc>) -> Result<EventSummary, EventStoreError> {
        Ok(UsageEvent::summary(&self.db, since).await?)
    }

    async fn tool_breakdown(&self, since: DateTime<Utc>) -> Result<Vec<ToolStats>, EventStoreError> {
        Ok(UsageEvent::tool_breakdown(&self.db, since).await?)
    }

    async fn daily_counts(&self, since: DateTime<Utc>) -> Result<Vec<DailyCount>, EventStoreError> {
        Ok(UsageEvent::daily_counts(&self.db, since).await?)
    }
}

/// In-memory event store
#[derive(Default)]
pub struct MemoryUsageEventStore {
    events: Mutex<Vec<UsageEvent>>,
    unavailable: AtomicBool,
}

impl MemoryUsageEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All stored events in insertion order
    pub async fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().await.clone()
    }

    /// Stores an event with an explicit timestamp
    pub async fn insert_at(&self, event: NewUsageEvent, created_at: DateTime<Utc>) -> UsageEvent {
        let event = event.into_event(created_at);
        self.events.lock().await.push(event.clone());
        event
    }

    fn ensure_available(&self) -> Result<(), EventStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(EventStoreError::Unavailable)
        } else {
            Ok(())
        }
    }

    async fn window(&self, since: DateTime<Utc>) -> Vec<UsageEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.created_at >= since)
            .cloned()
            .collect()
    }
}

fn count_status(events: &[&UsageEvent], status: UsageStatus) -> i64 {
    events.iter().filter(|e| e.status == status.as_str()).count() as i64
}

fn average_ms(events: &[&UsageEvent]) -> f64 {
    if events.is_empty() {
        return 0.0;
    }
    let total: i64 = events.iter().map(|e| e.processing_time_ms).sum();
    total as f64 / events.len() as f64
}

#[async_trait]
impl UsageEventStore for MemoryUsageEventStore {
    async fn insert(&self, event: NewUsageEvent) -> Result<UsageEvent, EventStoreError> {
        self.ensure_available()?;
        Ok(self.insert_at(event, Utc::now()).await)
    }

    async fn summary(&self, since: DateTime<Utc>) -> Result<EventSummary, EventStoreError> {
        self.ensure_available()?;
        let events = self.window(since).await;
        let refs: Vec<&UsageEvent> = events.iter().collect();

        Ok(EventSummary {
            total_events: refs.len() as i64,
            successes: count_status(&refs, UsageStatus::Success),
            errors: count_status(&refs, UsageStatus::Error),
            rate_limited: count_status(&refs, UsageStatus::RateLimited),
            distinct_users: refs.iter().map(|e| e.user_id).collect::<HashSet<_>>().len() as i64,
            avg_processing_time_ms: average_ms(&refs),
        })
    }

    async fn tool_breakdown(&self, since: DateTime<Utc>) -> Result<Vec<ToolStats>, EventStoreError> {
        self.ensure_available()?;
        let events = self.window(since).await;

        let mut groups: HashMap<(&str, &str), Vec<&UsageEvent>> = HashMap::new();
        for event in &events {
            groups
                .entry((event.tool_name.as_str(), event.tool_category.as_str()))
                .or_default()
                .push(event);
        }

        let mut stats: Vec<ToolStats> = groups
            .into_iter()
            .map(|((tool_name, tool_category), group)| ToolStats {
                tool_name: tool_name.to_string(),
                tool_category: tool_category.to_string(),
                total: group.len() as i64,
                successes: count_status(&group, UsageStatus::Success),
                errors: count_status(&group, UsageStatus::Error),
                avg_processing_time_ms: average_ms(&group),
            })
            .collect();

        stats.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.tool_name.cmp(&b.tool_name)));
        Ok(stats)
    }

    async fn daily_counts(&self, since: DateTime<Utc>) -> Result<Vec<DailyCount>, EventStoreError> {
        self.ensure_available()?;
        let events = self.window(since).await;

        let mut days: BTreeMap<NaiveDate, (i64, i64)> = BTreeMap::new();
        for event in &events {
            let entry = days.entry(event.created_at.date_naive()).or_default();
            entry.0 += 1;
            if event.status == UsageStatus::Error.as_str() {
                entry.1 += 1;
            }
        }

        Ok(days
            .into_iter()
            .map(|(day, (total, errors))| DailyCount { day, total, errors })
            .collect())
    }
}
