/// Profile stores backing the quota guard
///
/// [`ProfileStore`] is the seam between the guard and persistence:
///
/// - [`PgProfileStore`]: Postgres via the `usage_profiles` table
/// - [`MemoryProfileStore`]: in-process map for tests and database-less
///   development; can be flipped into an unavailable state to simulate outages
///
/// Both implement the increment as a single conditional update so the
/// counter can never pass the limit.

use crate::models::plan::QuotaType;
use crate::models::usage_profile::UsageProfile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Profile store error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Profile store unavailable")]
    Unavailable,
}

/// Persistence for usage profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Loads the profile of a user
    async fn find(&self, user_id: Uuid) -> Result<Option<UsageProfile>, StoreError>;

    /// Zeroes all counters and starts a new period at `now`
    async fn reset_period(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageProfile>, StoreError>;

    /// Atomically increments one counter if it is below `limit`
    ///
    /// Returns the new counter value, or `None` when the limit is reached or
    /// the profile does not exist.
    async fn try_increment(
        &self,
        user_id: Uuid,
        quota_type: QuotaType,
        limit: u32,
    ) -> Result<Option<u32>, StoreError>;

    /// Inserts or replaces a profile
    async fn upsert(&self, profile: UsageProfile) -> Result<UsageProfile, StoreError>;
}

/// Postgres-backed profile store
#[derive(Clone)]
pub struct PgProfileStore {
    db: PgPool,
}

impl PgProfileStore {
    pub fn new(db: PgPool) -> Self {
        PgProfileStore { db }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn find(&self, user_id: Uuid) -> Result<Option<UsageProfile>, StoreError> {
        Ok(UsageProfile::find_by_user(&self.db, user_id).await?)
    }

    async fn reset_period(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageProfile>, StoreError> {
        Ok(UsageProfile::reset_period(&self.db, user_id, now).await?)
    }

    async fn try_increment(
        &self,
        user_id: Uuid,
        quota_type: QuotaType,
        limit: u32,
    ) -> Result<Option<u32>, StoreError> {
        let value = UsageProfile::try_increment(&self.db, user_id, quota_type, limit).await?;
        Ok(value.map(|v| v.max(0) as u32))
    }

    async fn upsert(&self, profile: UsageProfile) -> Result<UsageProfile, StoreError> {
        Ok(UsageProfile::upsert(&self.db, &profile).await?)
    }
}

/// In-memory profile store
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<Uuid, UsageProfile>>,
    unavailable: AtomicBool,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Current copy of a profile, bypassing the availability switch
    pub async fn snapshot(&self, user_id: Uuid) -> Option<UsageProfile> {
        self.profiles.lock().await.get(&user_id).cloned()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn find(&self, user_id: Uuid) -> Result<Option<UsageProfile>, StoreError> {
        self.ensure_available()?;
        Ok(self.profiles.lock().await.get(&user_id).cloned())
    }

    async fn reset_period(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageProfile>, StoreError> {
        self.ensure_available()?;
        let mut profiles = self.profiles.lock().await;
        Ok(profiles.get_mut(&user_id).map(|profile| {
            profile.roll_over(now);
            profile.clone()
        }))
    }

    async fn try_increment(
        &self,
        user_id: Uuid,
        quota_type: QuotaType,
        limit: u32,
    ) -> Result<Option<u32>, StoreError> {
        self.ensure_available()?;
        let mut profiles = self.profiles.lock().await;
        let Some(profile) = profiles.get_mut(&user_id) else {
            return Ok(None);
        };

        let current = profile.used(quota_type);
        if current >= limit {
            return Ok(None);
        }

        let next = current + 1;
        *profile = profile.clone().with_used(quota_type, next as i32);
        profile.updated_at = Utc::now();
        Ok(Some(next))
    }

    async fn upsert(&self, profile: UsageProfile) -> Result<UsageProfile, StoreError> {
        self.ensure_available()?;
        self.profiles
            .lock()
            .await
            .insert(profile.user_id, profile.clone());
        Ok(profile)
    }
}
