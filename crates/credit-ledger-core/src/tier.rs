//! Subscription tiers and their per-period credit allotments.
//!
//! Tier changes and cancellations are managed elsewhere; the ledger only reads
//! the tier a user is on when a period is opened.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

// ============================================================================
// Constants
// ============================================================================

/// Free tier credit grant. Given once, on the user's first period only.
pub const FREE_TIER_CREDITS: f64 = 75.0;

/// Pro tier credits granted every period.
pub const PRO_TIER_CREDITS: f64 = 1000.0;

/// Team tier credits granted every period.
pub const TEAM_TIER_CREDITS: f64 = 2500.0;

/// Enterprise tier credits granted every period.
pub const ENTERPRISE_TIER_CREDITS: f64 = 10_000.0;

/// Available subscription tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    /// Free tier: one-time grant of 75 credits.
    Free,

    /// Pro tier: 1000 credits per period.
    Pro,

    /// Team tier: 2500 credits per period.
    Team,

    /// Enterprise tier: 10000 credits per period.
    Enterprise,
}

impl SubscriptionTier {
    /// All tiers, in ascending order of allotment.
    pub const ALL: [Self; 4] = [Self::Free, Self::Pro, Self::Team, Self::Enterprise];

    /// The fixed credit allotment for one period of this tier.
    #[must_use]
    pub const fn credits_per_period(self) -> f64 {
        match self {
            Self::Free => FREE_TIER_CREDITS,
            Self::Pro => PRO_TIER_CREDITS,
            Self::Team => TEAM_TIER_CREDITS,
            Self::Enterprise => ENTERPRISE_TIER_CREDITS,
        }
    }

    /// Whether this tier is paid (grants its allotment every period).
    #[must_use]
    pub const fn is_paid(self) -> bool {
        !matches!(self, Self::Free)
    }

    /// The tier name as stored by the persistence layer.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Team => "team",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "team" => Ok(Self::Team),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(LedgerError::InvalidTier(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_credits() {
        assert_eq!(SubscriptionTier::Free.credits_per_period(), 75.0);
        assert_eq!(SubscriptionTier::Pro.credits_per_period(), 1000.0);
        assert_eq!(SubscriptionTier::Team.credits_per_period(), 2500.0);
        assert_eq!(SubscriptionTier::Enterprise.credits_per_period(), 10_000.0);
    }

    #[test]
    fn tier_parse() {
        assert_eq!("pro".parse::<SubscriptionTier>().unwrap(), SubscriptionTier::Pro);
        assert_eq!(" Team ".parse::<SubscriptionTier>().unwrap(), SubscriptionTier::Team);
        assert!(matches!(
            "platinum".parse::<SubscriptionTier>(),
            Err(LedgerError::InvalidTier(t)) if t == "platinum"
        ));
    }

    #[test]
    fn tier_display_matches_serde() {
        for tier in SubscriptionTier::ALL {
            let json = serde_json::to_string(&tier).unwrap();
            assert_eq!(json, format!("\"{tier}\""));
        }
    }

    #[test]
    fn only_free_is_unpaid() {
        assert!(!SubscriptionTier::Free.is_paid());
        assert!(SubscriptionTier::Pro.is_paid());
        assert!(SubscriptionTier::Enterprise.is_paid());
    }
}
