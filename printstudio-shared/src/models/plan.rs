/// Plan tiers, quota types and the static plan-to-limit table
///
/// Every usage profile carries a plan tier. The tier decides how many
/// images, scenes and 3D models a user may produce per calendar month.
///
/// # Monthly Limits by Plan
///
/// | tier       | images | scenes | 3D models |
/// |------------|--------|--------|-----------|
/// | free       | 5      | 2      | 1         |
/// | starter    | 50     | 10     | 5         |
/// | pro        | 200    | 50     | 20        |
/// | premium    | 500    | 150    | 60        |
/// | enterprise | unlimited                      |
///
/// "Unlimited" is the [`UNLIMITED`] sentinel so it still fits an `INTEGER`
/// column when handed to the conditional increment.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel limit for plans without a cap
pub const UNLIMITED: u32 = i32::MAX as u32;

/// Subscription tier of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Starter,
    Pro,
    Premium,
    /// Custom contracts, no monthly cap
    Enterprise,
}

impl PlanTier {
    /// All tiers, cheapest first
    pub const ALL: [PlanTier; 5] = [
        PlanTier::Free,
        PlanTier::Starter,
        PlanTier::Pro,
        PlanTier::Premium,
        PlanTier::Enterprise,
    ];

    /// Converts tier to its stored string
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Starter => "starter",
            PlanTier::Pro => "pro",
            PlanTier::Premium => "premium",
            PlanTier::Enterprise => "enterprise",
        }
    }

    /// Parses a stored tier string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Some(PlanTier::Free),
            "starter" => Some(PlanTier::Starter),
            "pro" => Some(PlanTier::Pro),
            "premium" => Some(PlanTier::Premium),
            "enterprise" | "custom" => Some(PlanTier::Enterprise),
            _ => None,
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counter a tool invocation is charged against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaType {
    Images,
    Scenes,
    #[serde(rename = "models_3d")]
    Models3d,
}

impl QuotaType {
    pub const ALL: [QuotaType; 3] = [QuotaType::Images, QuotaType::Scenes, QuotaType::Models3d];

    /// Machine name
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaType::Images => "images",
            QuotaType::Scenes => "scenes",
            QuotaType::Models3d => "models_3d",
        }
    }

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            QuotaType::Images => "Monthly images",
            QuotaType::Scenes => "Monthly scenes",
            QuotaType::Models3d => "Monthly 3D models",
        }
    }

    /// Counter column in `usage_profiles`
    ///
    /// Only ever interpolated into SQL from this fixed set.
    pub fn column(&self) -> &'static str {
        match self {
            QuotaType::Images => "images_used",
            QuotaType::Scenes => "scenes_used",
            QuotaType::Models3d => "models_3d_used",
        }
    }
}

impl fmt::Display for QuotaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monthly limits of one plan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub images: u32,
    pub scenes: u32,
    pub models_3d: u32,
}

impl QuotaLimits {
    /// Gets quota limits for a plan tier
    pub fn for_plan(plan: PlanTier) -> Self {
        match plan {
            PlanTier::Free => QuotaLimits {
                images: 5,
                scenes: 2,
                models_3d: 1,
            },
            PlanTier::Starter => QuotaLimits {
                images: 50,
                scenes: 10,
                models_3d: 5,
            },
            PlanTier::Pro => QuotaLimits {
                images: 200,
                scenes: 50,
                models_3d: 20,
            },
            PlanTier::Premium => QuotaLimits {
                images: 500,
                scenes: 150,
                models_3d: 60,
            },
            PlanTier::Enterprise => QuotaLimits {
                images: UNLIMITED,
                scenes: UNLIMITED,
                models_3d: UNLIMITED,
            },
        }
    }

    /// Gets limit for a specific quota type
    pub fn get(&self, quota_type: QuotaType) -> u32 {
        match quota_type {
            QuotaType::Images => self.images,
            QuotaType::Scenes => self.scenes,
            QuotaType::Models3d => self.models_3d,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_limits() {
        let limits = QuotaLimits::for_plan(PlanTier::Free);
        assert_eq!(limits.get(QuotaType::Images), 5);
        assert_eq!(limits.get(QuotaType::Scenes), 2);
        assert_eq!(limits.get(QuotaType::Models3d), 1);
    }

    #[test]
    fn test_limits_grow_with_tier() {
        for quota_type in QuotaType::ALL {
            let mut previous = 0;
            for plan in PlanTier::ALL {
                let limit = QuotaLimits::for_plan(plan).get(quota_type);
                assert!(limit > previous, "{} on {} should exceed lower tiers", quota_type, plan);
                previous = limit;
            }
        }
    }

    #[test]
    fn test_enterprise_is_unlimited() {
        let limits = QuotaLimits::for_plan(PlanTier::Enterprise);
        assert_eq!(limits.images, UNLIMITED);
        assert_eq!(UNLIMITED, i32::MAX as u32);
    }

    #[test]
    fn test_plan_parse() {
        assert_eq!(PlanTier::parse("pro"), Some(PlanTier::Pro));
        assert_eq!(PlanTier::parse(" Premium "), Some(PlanTier::Premium));
        assert_eq!(PlanTier::parse("custom"), Some(PlanTier::Enterprise));
        assert_eq!(PlanTier::parse("gold"), None);

        for plan in PlanTier::ALL {
            assert_eq!(PlanTier::parse(plan.as_str()), Some(plan));
        }
    }

    #[test]
    fn test_quota_type_serde() {
        assert_eq!(serde_json::to_string(&QuotaType::Models3d).unwrap(), "\"models_3d\"");
        let parsed: QuotaType = serde_json::from_str("\"images\"").unwrap();
        assert_eq!(parsed, QuotaType::Images);
    }

    #[test]
    fn test_quota_type_columns() {
        assert_eq!(QuotaType::Images.column(), "images_used");
        assert_eq!(QuotaType::Scenes.column(), "scenes_used");
        assert_eq!(QuotaType::Models3d.column(), "models_3d_used");
    }
}
