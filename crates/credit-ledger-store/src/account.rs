//! Account profile: the external facts the ledger needs about a user.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use credit_ledger_core::{SubscriptionTier, UserId};

/// Tier and period anchor for a user, supplied by the surrounding product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    /// The user.
    pub user_id: UserId,

    /// Current subscription tier.
    pub tier: SubscriptionTier,

    /// Day billing periods are anchored on (usually the sign-up date).
    pub period_anchor: NaiveDate,

    /// When the profile was registered.
    pub created_at: DateTime<Utc>,
}

impl AccountProfile {
    /// Create a profile anchored on `period_anchor`.
    #[must_use]
    pub fn new(user_id: UserId, tier: SubscriptionTier, period_anchor: NaiveDate) -> Self {
        Self {
            user_id,
            tier,
            period_anchor,
            created_at: Utc::now(),
        }
    }
}
