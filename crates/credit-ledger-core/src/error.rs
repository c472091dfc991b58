//! Error types for the credit ledger engine.

use crate::ids::IdError;
use crate::pricing::Modality;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur while pricing usage or mutating a ledger row.
///
/// Invariant violations on stored rows (`used > granted`) are not represented
/// here: they indicate a broken read-modify-write upstream and panic instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// No rate is configured for a model/modality pair.
    ///
    /// This is a configuration failure. It must never be treated as a zero cost.
    #[error("no pricing configured for model {model} ({modality})")]
    PricingMissing {
        /// The model name that was looked up.
        model: String,
        /// The modality that was looked up.
        modality: Modality,
    },

    /// A deduction would exceed the remaining balance across both buckets.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Credits remaining across subscription and purchased buckets.
        available: f64,
        /// Credits the operation needs.
        required: f64,
    },

    /// A credit amount was negative or not a finite number.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A subscription tier string could not be parsed.
    #[error("invalid subscription tier: {0}")]
    InvalidTier(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_missing_message_names_model() {
        let err = LedgerError::PricingMissing {
            model: "gpt-unknown".into(),
            modality: Modality::Text,
        };
        assert_eq!(
            err.to_string(),
            "no pricing configured for model gpt-unknown (text)"
        );
    }

    #[test]
    fn insufficient_credits_message_carries_amounts() {
        let err = LedgerError::InsufficientCredits {
            available: 0.2,
            required: 0.6,
        };
        assert!(err.to_string().contains("0.6"));
    }
}
