//! Background usage event recorder

use super::store::UsageEventStore;
use crate::models::usage_event::NewUsageEvent;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Event rejected before it was written
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("Missing required event field: {0}")]
    MissingField(&'static str),
}

/// Writes usage events without blocking the caller
#[derive(Clone, Default)]
pub struct UsageEventRecorder {
    store: Option<Arc<dyn UsageEventStore>>,
}

impl UsageEventRecorder {
    pub fn new(store: Arc<dyn UsageEventStore>) -> Self {
        UsageEventRecorder { store: Some(store) }
    }

    /// Recorder that logs events and drops them
    pub fn disabled() -> Self {
        UsageEventRecorder { store: None }
    }

    pub fn store(&self) -> Option<&Arc<dyn UsageEventStore>> {
        self.store.as_ref()
    }

    /// Validates the event and spawns its insert
    ///
    /// Returns the insert task when a store is configured. The task never
    /// fails: write errors are logged and the event is dropped.
    pub fn record(&self, event: NewUsageEvent) -> Result<Option<JoinHandle<()>>, RecordError> {
        if event.tool_name.trim().is_empty() {
            return Err(RecordError::MissingField("tool_name"));
        }
        if event.tool_category.trim().is_empty() {
            return Err(RecordError::MissingField("tool_category"));
        }

        let Some(store) = self.store.clone() else {
            tracing::debug!(
                user_id = %event.user_id,
                tool = %event.tool_name,
                status = %event.status,
                "No event store configured, usage event dropped"
            );
            return Ok(None);
        };

        let handle = tokio::spawn(async move {
            let user_id = event.user_id;
            let tool = event.tool_name.clone();
            let status = event.status;

            match store.insert(event).await {
                Ok(stored) => {
                    tracing::debug!(
                        event_id = %stored.id,
                        user_id = %user_id,
                        tool = %tool,
                        status = %status,
                        "Usage event recorded"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        tool = %tool,
                        status = %status,
                        error = %e,
                        "Failed to record usage event"
                    );
                }
            }
        });

        Ok(Some(handle))
    }
}
