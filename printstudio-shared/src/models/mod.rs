/// Database models for PrintStudio
///
/// # Models
///
/// - `plan`: Plan tiers, quota types and the monthly limit table
/// - `usage_profile`: Per-user plan and usage counters
/// - `usage_event`: Append-only log of tool invocations and analytics queries

pub mod plan;
pub mod usage_event;
pub mod usage_profile;

pub use plan::{PlanTier, QuotaLimits, QuotaType, UNLIMITED};
pub use usage_event::{DailyCount, EventSummary, NewUsageEvent, ToolStats, UsageEvent, UsageStatus};
pub use usage_profile::UsageProfile;
