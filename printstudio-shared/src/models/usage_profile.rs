/// Usage profile model and database operations
///
/// One row per user holding the plan tier and the counters of the current
/// monthly usage period. Rows are created at registration by the auth
/// backend; this crate only reads, resets and increments them.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE usage_profiles (
///     user_id UUID PRIMARY KEY,
///     plan_tier TEXT NOT NULL DEFAULT 'free',
///     period_start TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     images_used INTEGER NOT NULL DEFAULT 0 CHECK (images_used >= 0),
///     scenes_used INTEGER NOT NULL DEFAULT 0 CHECK (scenes_used >= 0),
///     models_3d_used INTEGER NOT NULL DEFAULT 0 CHECK (models_3d_used >= 0),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use crate::models::plan::{PlanTier, QuotaType};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Per-user plan and usage counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UsageProfile {
    pub user_id: Uuid,

    /// Stored plan tier; unknown values count as free
    pub plan_tier: String,

    /// Start of the current usage period
    pub period_start: DateTime<Utc>,

    pub images_used: i32,
    pub scenes_used: i32,
    pub models_3d_used: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UsageProfile {
    /// Builds a fresh profile with zeroed counters
    pub fn new(user_id: Uuid, plan: PlanTier, period_start: DateTime<Utc>) -> Self {
        let now = Utc::now();
        UsageProfile {
            user_id,
            plan_tier: plan.as_str().to_string(),
            period_start,
            images_used: 0,
            scenes_used: 0,
            models_3d_used: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Parsed plan tier
    pub fn plan(&self) -> PlanTier {
        PlanTier::parse(&self.plan_tier).unwrap_or(PlanTier::Free)
    }

    /// Counter value for a quota type, clamped at zero
    pub fn used(&self, quota_type: QuotaType) -> u32 {
        let value = match quota_type {
            QuotaType::Images => self.images_used,
            QuotaType::Scenes => self.scenes_used,
            QuotaType::Models3d => self.models_3d_used,
        };
        value.max(0) as u32
    }

    /// Sets a counter (seeding and tests)
    pub fn with_used(mut self, quota_type: QuotaType, value: i32) -> Self {
        match quota_type {
            QuotaType::Images => self.images_used = value,
            QuotaType::Scenes => self.scenes_used = value,
            QuotaType::Models3d => self.models_3d_used = value,
        }
        self
    }

    /// Whether `now` falls in a later (or earlier) calendar month than the period start
    pub fn is_new_period(&self, now: DateTime<Utc>) -> bool {
        is_new_period(self.period_start, now)
    }

    /// Zeroes all counters and starts a new period at `now`
    pub fn roll_over(&mut self, now: DateTime<Utc>) {
        self.images_used = 0;
        self.scenes_used = 0;
        self.models_3d_used = 0;
        self.period_start = now;
        self.updated_at = now;
    }
}

/// Compares the UTC (year, month) of two instants
pub fn is_new_period(period_start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (period_start.year(), period_start.month()) != (now.year(), now.month())
}

impl UsageProfile {
    /// Finds the profile of a user
    pub async fn find_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let profile = sqlx::query_as::<_, UsageProfile>(
            r#"
            SELECT user_id, plan_tier, period_start, images_used, scenes_used,
                   models_3d_used, created_at, updated_at
            FROM usage_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(profile)
    }

    /// Zeroes all counters and moves the period start to `now`
    ///
    /// Returns `None` if the profile does not exist.
    pub async fn reset_period(
        pool: &PgPool,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let profile = sqlx::query_as::<_, UsageProfile>(
            r#"
            UPDATE usage_profiles
            SET images_used = 0,
                scenes_used = 0,
                models_3d_used = 0,
                period_start = $2,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING user_id, plan_tier, period_start, images_used, scenes_used,
                      models_3d_used, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(pool)
        .await?;

        Ok(profile)
    }

    /// Increments one counter if it is still below `limit`
    ///
    /// Check and write happen in a single statement, so concurrent callers
    /// can never push the counter past the limit. Returns the new value, or
    /// `None` when the limit was already reached or the profile is missing.
    pub async fn try_increment(
        pool: &PgPool,
        user_id: Uuid,
        quota_type: QuotaType,
        limit: u32,
    ) -> Result<Option<i32>, sqlx::Error> {
        let column = quota_type.column();
        let sql = format!(
            "UPDATE usage_profiles \
             SET {column} = {column} + 1, updated_at = NOW() \
             WHERE user_id = $1 AND {column} < $2 \
             RETURNING {column}"
        );

        let limit = i32::try_from(limit).unwrap_or(i32::MAX);

        let value = sqlx::query_scalar::<_, i32>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_optional(pool)
            .await?;

        Ok(value)
    }

    /// Inserts or replaces a profile
    pub async fn upsert(pool: &PgPool, profile: &UsageProfile) -> Result<Self, sqlx::Error> {
        let profile = sqlx::query_as::<_, UsageProfile>(
            r#"
            INSERT INTO usage_profiles
                (user_id, plan_tier, period_start, images_used, scenes_used, models_3d_used)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                plan_tier = EXCLUDED.plan_tier,
                period_start = EXCLUDED.period_start,
                images_used = EXCLUDED.images_used,
                scenes_used = EXCLUDED.scenes_used,
                models_3d_used = EXCLUDED.models_3d_used,
                updated_at = NOW()
            RETURNING user_id, plan_tier, period_start, images_used, scenes_used,
                      models_3d_used, created_at, updated_at
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.plan_tier)
        .bind(profile.period_start)
        .bind(profile.images_used)
        .bind(profile.scenes_used)
        .bind(profile.models_3d_used)
        .fetch_one(pool)
        .await?;

        Ok(profile)
    }
}
