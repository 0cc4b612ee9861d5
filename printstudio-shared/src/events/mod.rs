/// Usage event recording
///
/// Every tool invocation attempt produces one [`NewUsageEvent`] that the
/// [`UsageEventRecorder`] writes in the background. Recording is best-effort
/// telemetry: a failed insert is logged and dropped, never returned to the
/// request that caused it.
///
/// # Example
///
/// ```no_run
/// use printstudio_shared::events::{UsageEventRecorder, store::PgUsageEventStore};
/// use printstudio_shared::models::{NewUsageEvent, UsageStatus};
/// use sqlx::PgPool;
/// use std::sync::Arc;
/// use uuid::Uuid;
///
/// # fn example(pool: PgPool, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let recorder = UsageEventRecorder::new(Arc::new(PgUsageEventStore::new(pool)));
///
/// recorder.record(
///     NewUsageEvent::new(user_id, "color-change", "image-editing", UsageStatus::Success)
///         .processing_time_ms(4_200),
/// )?;
/// # Ok(())
/// # }
/// ```
///
/// [`NewUsageEvent`]: crate::models::NewUsageEvent

pub mod recorder;
pub mod store;

pub use recorder::{RecordError, UsageEventRecorder};
pub use store::{EventStoreError, MemoryUsageEventStore, PgUsageEventStore, UsageEventStore};
