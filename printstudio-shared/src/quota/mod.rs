/// Usage quota enforcement
///
/// The [`QuotaGuard`] decides whether a tool invocation is allowed under the
/// caller's plan, rolls counters over at the start of each calendar month,
/// and charges successful invocations.
///
/// # Behavior
///
/// - **Rollover**: when the stored period start lies in another (year, month)
///   than now (UTC), all three counters are zeroed and the period restarts
///   before the limit is evaluated. The reset is persisted whatever the
///   outcome of the check.
/// - **Decision**: `allowed = used < limit`. Denials carry the reason, the
///   current usage and the limit.
/// - **Missing profile**: allowed, logged as a configuration anomaly.
/// - **Store failure**: governed by [`FailurePolicy`]. `Open` (default)
///   allows the call; `Closed` returns [`QuotaError::StoreUnavailable`].
/// - **Charging**: [`QuotaGuard::increment`] uses the store's conditional
///   increment, so racing requests can under-use but never over-count.
///
/// # Example
///
/// ```no_run
/// use printstudio_shared::models::QuotaType;
/// use printstudio_shared::quota::{QuotaGuard, store::PgProfileStore};
/// use sqlx::PgPool;
/// use std::sync::Arc;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let guard = QuotaGuard::new(Arc::new(PgProfileStore::new(pool)));
///
/// let result = guard.check(user_id, QuotaType::Images).await?;
/// if result.allowed {
///     // run the tool, then charge it
///     guard.increment(user_id, QuotaType::Images).await?;
/// }
/// # Ok(())
/// # }
/// ```

pub mod store;

use crate::models::plan::{PlanTier, QuotaLimits, QuotaType, UNLIMITED};
use crate::models::usage_profile::UsageProfile;
use crate::tools::find_tool;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use store::{ProfileStore, StoreError};
use uuid::Uuid;

/// What to do when the profile store cannot answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Allow the invocation
    #[default]
    Open,

    /// Refuse the invocation
    Closed,
}

impl FailurePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Some(FailurePolicy::Open),
            "closed" => Some(FailurePolicy::Closed),
            _ => None,
        }
    }
}

/// Quota enforcement error
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// Limit reached
    #[error("{} limit exceeded ({current}/{limit})", .quota_type.label())]
    LimitExceeded {
        quota_type: QuotaType,
        limit: u32,
        current: u32,
    },

    /// Store unreachable or unconfigured under the closed policy
    #[error("Quota store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Result of a quota check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaCheckResult {
    pub allowed: bool,
    pub quota_type: QuotaType,

    /// Why the call was refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub current_usage: u32,
    pub limit: u32,
    pub remaining: u32,

    /// False when the guard failed open without looking at a profile
    pub enforced: bool,
}

impl QuotaCheckResult {
    /// Creates a result indicating quota is available
    pub fn allowed(quota_type: QuotaType, current: u32, limit: u32) -> Self {
        QuotaCheckResult {
            allowed: true,
            quota_type,
            reason: None,
            current_usage: current,
            limit,
            remaining: limit.saturating_sub(current),
            enforced: true,
        }
    }

    /// Creates a result indicating quota is exhausted
    pub fn exceeded(quota_type: QuotaType, current: u32, limit: u32) -> Self {
        QuotaCheckResult {
            allowed: false,
            quota_type,
            reason: Some(format!(
                "{} limit reached ({}/{}). Upgrade your plan or wait for the next period.",
                quota_type.label(),
                current,
                limit
            )),
            current_usage: current,
            limit,
            remaining: 0,
            enforced: true,
        }
    }

    /// Fail-open result: allowed without a profile to check against
    pub fn unenforced(quota_type: QuotaType) -> Self {
        QuotaCheckResult {
            allowed: true,
            quota_type,
            reason: None,
            current_usage: 0,
            limit: UNLIMITED,
            remaining: UNLIMITED,
            enforced: false,
        }
    }

    /// Converts a denial into an error
    pub fn into_result(self) -> Result<Self, QuotaError> {
        if self.allowed {
            Ok(self)
        } else {
            Err(QuotaError::LimitExceeded {
                quota_type: self.quota_type,
                limit: self.limit,
                current: self.current_usage,
            })
        }
    }
}

/// Outcome of charging one use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// Counter incremented to the contained value
    Counted(u32),

    /// Counter already at the limit; a concurrent request used the last unit
    LimitReached,

    /// Nothing to charge (no profile, or store down under the open policy)
    Skipped,
}

/// Usage of one quota type in the current period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub quota_type: QuotaType,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub unlimited: bool,
}

/// Plan and usage overview of one user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub user_id: Uuid,
    pub plan: PlanTier,
    pub period_start: DateTime<Utc>,
    pub quotas: Vec<QuotaUsage>,
}

/// Quota guard
///
/// Cheap to clone; holds the store behind an `Arc`.
#[derive(Clone)]
pub struct QuotaGuard {
    store: Option<Arc<dyn ProfileStore>>,
    policy: FailurePolicy,
}

impl QuotaGuard {
    /// Creates a guard over a profile store with the open policy
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        QuotaGuard {
            store: Some(store),
            policy: FailurePolicy::Open,
        }
    }

    /// Creates a guard with no backing store
    pub fn unconfigured() -> Self {
        QuotaGuard {
            store: None,
            policy: FailurePolicy::Open,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    /// Checks whether the user may use one more unit of `quota_type`
    pub async fn check(
        &self,
        user_id: Uuid,
        quota_type: QuotaType,
    ) -> Result<QuotaCheckResult, QuotaError> {
        self.check_at(user_id, quota_type, Utc::now()).await
    }

    /// Same as [`check`](Self::check) with an explicit clock
    pub async fn check_at(
        &self,
        user_id: Uuid,
        quota_type: QuotaType,
        now: DateTime<Utc>,
    ) -> Result<QuotaCheckResult, QuotaError> {
        let profile = match self.load_current(user_id, now).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::warn!(
                    user_id = %user_id,
                    quota_type = %quota_type,
                    "No usage profile for user, allowing request"
                );
                return Ok(QuotaCheckResult::unenforced(quota_type));
            }
            Err(err) => {
                return self
                    .on_store_failure(user_id, &err)
                    .map(|_| QuotaCheckResult::unenforced(quota_type));
            }
        };

        let limit = QuotaLimits::for_plan(profile.plan()).get(quota_type);
        let current = profile.used(quota_type);

        if current < limit {
            Ok(QuotaCheckResult::allowed(quota_type, current, limit))
        } else {
            tracing::info!(
                user_id = %user_id,
                quota_type = %quota_type,
                plan = %profile.plan(),
                current,
                limit,
                "Quota exhausted"
            );
            Ok(QuotaCheckResult::exceeded(quota_type, current, limit))
        }
    }

    /// Checks the quota a tool is charged against
    pub async fn check_tool(
        &self,
        user_id: Uuid,
        tool_name: &str,
    ) -> Result<QuotaCheckResult, QuotaError> {
        let tool = find_tool(tool_name).ok_or_else(|| QuotaError::UnknownTool(tool_name.to_string()))?;
        self.check(user_id, tool.quota_type).await
    }

    /// Charges one unit of `quota_type`
    pub async fn increment(
        &self,
        user_id: Uuid,
        quota_type: QuotaType,
    ) -> Result<IncrementOutcome, QuotaError> {
        let Some(store) = &self.store else {
            tracing::debug!(user_id = %user_id, "No profile store configured, usage not counted");
            return Ok(IncrementOutcome::Skipped);
        };

        let profile = match store.find(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::warn!(user_id = %user_id, "No usage profile for user, usage not counted");
                return Ok(IncrementOutcome::Skipped);
            }
            Err(err) => {
                return self
                    .on_store_failure(user_id, &err)
                    .map(|_| IncrementOutcome::Skipped);
            }
        };

        let limit = QuotaLimits::for_plan(profile.plan()).get(quota_type);

        match store.try_increment(user_id, quota_type, limit).await {
            Ok(Some(value)) => {
                tracing::debug!(
                    user_id = %user_id,
                    quota_type = %quota_type,
                    value,
                    limit,
                    "Usage counted"
                );
                Ok(IncrementOutcome::Counted(value))
            }
            Ok(None) => {
                tracing::warn!(
                    user_id = %user_id,
                    quota_type = %quota_type,
                    limit,
                    "Counter already at limit, concurrent request consumed the last unit"
                );
                Ok(IncrementOutcome::LimitReached)
            }
            Err(err) => self
                .on_store_failure(user_id, &err)
                .map(|_| IncrementOutcome::Skipped),
        }
    }

    /// Plan and per-quota usage after applying any pending rollover
    ///
    /// Returns `None` when the user has no profile.
    pub async fn summary(&self, user_id: Uuid) -> Result<Option<UsageSummary>, QuotaError> {
        if self.store.is_none() {
            return Err(QuotaError::StoreUnavailable(
                "profile store not configured".to_string(),
            ));
        }

        let profile = self
            .load_current(user_id, Utc::now())
            .await
            .map_err(|err| QuotaError::StoreUnavailable(err.to_string()))?;

        Ok(profile.map(|profile| {
            let plan = profile.plan();
            let limits = QuotaLimits::for_plan(plan);
            let quotas = QuotaType::ALL
                .iter()
                .map(|&quota_type| {
                    let used = profile.used(quota_type);
                    let limit = limits.get(quota_type);
                    QuotaUsage {
                        quota_type,
                        used,
                        limit,
                        remaining: limit.saturating_sub(used),
                        unlimited: limit == UNLIMITED,
                    }
                })
                .collect();

            UsageSummary {
                user_id,
                plan,
                period_start: profile.period_start,
                quotas,
            }
        }))
    }

    /// Loads the profile, persisting a period rollover first if one is due
    async fn load_current(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageProfile>, StoreError> {
        let store = self.store.as_ref().ok_or(StoreError::Unavailable)?;

        let Some(profile) = store.find(user_id).await? else {
            return Ok(None);
        };

        if !profile.is_new_period(now) {
            return Ok(Some(profile));
        }

        tracing::info!(
            user_id = %user_id,
            previous_period = %profile.period_start,
            "New usage period, resetting counters"
        );

        store.reset_period(user_id, now).await
    }

    fn on_store_failure(&self, user_id: Uuid, err: &StoreError) -> Result<(), QuotaError> {
        match self.policy {
            FailurePolicy::Open => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %err,
                    "Profile store unavailable, failing open"
                );
                Ok(())
            }
            FailurePolicy::Closed => {
                tracing::error!(
                    user_id = %user_id,
                    error = %err,
                    "Profile store unavailable, refusing request"
                );
                Err(QuotaError::StoreUnavailable(err.to_string()))
            }
        }
    }
}
