//! Pricing configuration for metered AI operations.
//!
//! Rates are keyed by model name and usage modality. The table is a plain value
//! handed to the [`CostCalculator`](crate::cost::CostCalculator); tests build
//! synthetic tables with [`PricingTable::empty`] and [`PricingTable::insert`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Token rates are quoted per this many tokens.
pub const TOKENS_PER_RATE_UNIT: f64 = 1_000_000.0;

/// Default markup applied to provider cost before conversion to credits.
pub const DEFAULT_MARGIN_MULTIPLIER: f64 = 1.5;

/// Default USD value of one credit.
pub const DEFAULT_CREDIT_VALUE_USD: f64 = 0.05;

/// How a metered operation consumes resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Text generation billed by tokens.
    Text,
    /// Realtime voice conversation billed by text and audio tokens.
    Realtime,
    /// Token-billed image generation.
    Image,
    /// Speech-to-text billed by tokens.
    Transcription,
    /// Generations billed at a fixed price each.
    FlatRate,
}

impl Modality {
    /// The modality name used in configuration files and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Realtime => "realtime",
            Self::Image => "image",
            Self::Transcription => "transcription",
            Self::FlatRate => "flat_rate",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// USD rates per million tokens for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenRates {
    /// Uncached input tokens.
    pub input: f64,
    /// Cached input tokens.
    pub cached_input: f64,
    /// Output tokens.
    pub output: f64,
}

impl TokenRates {
    /// Create a rate set.
    #[must_use]
    pub const fn new(input: f64, cached_input: f64, output: f64) -> Self {
        Self {
            input,
            cached_input,
            output,
        }
    }
}

/// The price of one model for one modality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceSpec {
    /// Single token channel (text, transcription).
    Tokens(TokenRates),

    /// Realtime sessions: text and audio tokens are priced separately.
    Realtime {
        /// Text channel rates.
        text: TokenRates,
        /// Audio channel rates.
        audio: TokenRates,
    },

    /// Image generation: prompt text and image tokens are priced separately.
    Image {
        /// Text channel rates.
        text: TokenRates,
        /// Image channel rates.
        image: TokenRates,
    },

    /// Fixed USD price per generation.
    PerGeneration {
        /// USD per generated unit.
        cost_per_generation: f64,
    },
}

/// Key for looking up a model's price.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PricingKey {
    /// Model name (e.g. "gpt-4o-mini").
    pub model: String,
    /// How the model is used.
    pub modality: Modality,
}

impl PricingKey {
    /// Create a new pricing key.
    #[must_use]
    pub fn new(model: impl Into<String>, modality: Modality) -> Self {
        Self {
            model: model.into(),
            modality,
        }
    }
}

/// One row of a pricing file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingEntry {
    /// Model name.
    pub model: String,
    /// Usage modality.
    pub modality: Modality,
    /// Rates for this pair.
    pub price: PriceSpec,
}

/// Mapping from (model, modality) to rates.
///
/// Serialized as a list of [`PricingEntry`] so pricing files stay plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<PricingEntry>", into = "Vec<PricingEntry>")]
pub struct PricingTable {
    prices: HashMap<PricingKey, PriceSpec>,
}

impl PricingTable {
    /// A table with no prices. Every lookup fails until entries are inserted.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    /// Add or replace the price of a model/modality pair.
    pub fn insert(&mut self, model: impl Into<String>, modality: Modality, price: PriceSpec) {
        self.prices.insert(PricingKey::new(model, modality), price);
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with_price(
        mut self,
        model: impl Into<String>,
        modality: Modality,
        price: PriceSpec,
    ) -> Self {
        self.insert(model, modality, price);
        self
    }

    /// Number of configured prices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether the table has no prices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Look up the price of a model for a modality.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::PricingMissing` if the pair is not configured.
    pub fn lookup(&self, model: &str, modality: Modality) -> Result<&PriceSpec> {
        self.prices
            .get(&PricingKey::new(model, modality))
            .ok_or_else(|| missing(model, modality))
    }

    /// Single-channel token rates for text or transcription.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::PricingMissing` if the pair is absent or is not
    /// priced per token.
    pub fn token_rates(&self, model: &str, modality: Modality) -> Result<TokenRates> {
        match self.lookup(model, modality)? {
            PriceSpec::Tokens(rates) => Ok(*rates),
            _ => Err(missing(model, modality)),
        }
    }

    /// Text and audio rates for a realtime model.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::PricingMissing` if no realtime price is configured.
    pub fn realtime_rates(&self, model: &str) -> Result<(TokenRates, TokenRates)> {
        match self.lookup(model, Modality::Realtime)? {
            PriceSpec::Realtime { text, audio } => Ok((*text, *audio)),
            _ => Err(missing(model, Modality::Realtime)),
        }
    }

    /// Text and image rates for an image model.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::PricingMissing` if no image price is configured.
    pub fn image_rates(&self, model: &str) -> Result<(TokenRates, TokenRates)> {
        match self.lookup(model, Modality::Image)? {
            PriceSpec::Image { text, image } => Ok((*text, *image)),
            _ => Err(missing(model, Modality::Image)),
        }
    }

    /// USD per generation for a flat-rate model.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::PricingMissing` if no flat rate is configured.
    pub fn cost_per_generation(&self, model: &str) -> Result<f64> {
        match self.lookup(model, Modality::FlatRate)? {
            PriceSpec::PerGeneration {
                cost_per_generation,
            } => Ok(*cost_per_generation),
            _ => Err(missing(model, Modality::FlatRate)),
        }
    }
}

fn missing(model: &str, modality: Modality) -> LedgerError {
    LedgerError::PricingMissing {
        model: model.to_string(),
        modality,
    }
}

impl From<Vec<PricingEntry>> for PricingTable {
    fn from(entries: Vec<PricingEntry>) -> Self {
        let prices = entries
            .into_iter()
            .map(|e| (PricingKey::new(e.model, e.modality), e.price))
            .collect();
        Self { prices }
    }
}

impl From<PricingTable> for Vec<PricingEntry> {
    fn from(table: PricingTable) -> Self {
        let mut entries: Vec<PricingEntry> = table
            .prices
            .into_iter()
            .map(|(key, price)| PricingEntry {
                model: key.model,
                modality: key.modality,
                price,
            })
            .collect();
        entries.sort_by(|a, b| (a.modality, &a.model).cmp(&(b.modality, &b.model)));
        entries
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::empty()
            // Text models (USD per 1M tokens: input, cached input, output)
            .with_price(
                "gpt-4o",
                Modality::Text,
                PriceSpec::Tokens(TokenRates::new(2.50, 1.25, 10.00)),
            )
            .with_price(
                "gpt-4o-mini",
                Modality::Text,
                PriceSpec::Tokens(TokenRates::new(0.15, 0.075, 0.60)),
            )
            .with_price(
                "gpt-4.1",
                Modality::Text,
                PriceSpec::Tokens(TokenRates::new(2.00, 0.50, 8.00)),
            )
            .with_price(
                "gpt-4.1-mini",
                Modality::Text,
                PriceSpec::Tokens(TokenRates::new(0.40, 0.10, 1.60)),
            )
            // Realtime voice
            .with_price(
                "gpt-4o-realtime-preview",
                Modality::Realtime,
                PriceSpec::Realtime {
                    text: TokenRates::new(5.00, 2.50, 20.00),
                    audio: TokenRates::new(40.00, 2.50, 80.00),
                },
            )
            .with_price(
                "gpt-4o-mini-realtime-preview",
                Modality::Realtime,
                PriceSpec::Realtime {
                    text: TokenRates::new(0.60, 0.30, 2.40),
                    audio: TokenRates::new(10.00, 0.30, 20.00),
                },
            )
            // Image generation
            .with_price(
                "gpt-image-1",
                Modality::Image,
                PriceSpec::Image {
                    text: TokenRates::new(5.00, 1.25, 0.0),
                    image: TokenRates::new(10.00, 2.50, 40.00),
                },
            )
            // Transcription
            .with_price(
                "gpt-4o-transcribe",
                Modality::Transcription,
                PriceSpec::Tokens(TokenRates::new(6.00, 0.0, 10.00)),
            )
            .with_price(
                "gpt-4o-mini-transcribe",
                Modality::Transcription,
                PriceSpec::Tokens(TokenRates::new(3.00, 0.0, 5.00)),
            )
            // Flat-rate generations
            .with_price(
                "black-forest-labs/flux-schnell",
                Modality::FlatRate,
                PriceSpec::PerGeneration {
                    cost_per_generation: 0.003,
                },
            )
            .with_price(
                "black-forest-labs/flux-1.1-pro",
                Modality::FlatRate,
                PriceSpec::PerGeneration {
                    cost_per_generation: 0.04,
                },
            )
    }
}

/// Conversion from provider USD cost to credits.
///
/// `credits = usd * margin_multiplier / credit_value_usd`. All cost paths go
/// through [`CreditConversion::credits_from_usd`] so every modality shares one
/// exchange rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditConversion {
    /// Markup applied to provider cost.
    pub margin_multiplier: f64,
    /// USD value of one credit.
    pub credit_value_usd: f64,
}

impl Default for CreditConversion {
    fn default() -> Self {
        Self {
            margin_multiplier: DEFAULT_MARGIN_MULTIPLIER,
            credit_value_usd: DEFAULT_CREDIT_VALUE_USD,
        }
    }
}

impl CreditConversion {
    /// Convert a provider cost in USD to credits.
    #[must_use]
    pub fn credits_from_usd(&self, usd: f64) -> f64 {
        usd * self.margin_multiplier / self.credit_value_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_covers_every_modality() {
        let table = PricingTable::default();
        assert!(table.token_rates("gpt-4o-mini", Modality::Text).is_ok());
        assert!(table.realtime_rates("gpt-4o-realtime-preview").is_ok());
        assert!(table.image_rates("gpt-image-1").is_ok());
        assert!(table
            .token_rates("gpt-4o-transcribe", Modality::Transcription)
            .is_ok());
        assert!(table
            .cost_per_generation("black-forest-labs/flux-schnell")
            .is_ok());
    }

    #[test]
    fn unknown_model_is_pricing_missing() {
        let table = PricingTable::default();
        let err = table.lookup("mystery-model", Modality::Text).unwrap_err();
        assert_eq!(
            err,
            LedgerError::PricingMissing {
                model: "mystery-model".into(),
                modality: Modality::Text,
            }
        );
    }

    #[test]
    fn wrong_modality_is_pricing_missing() {
        let table = PricingTable::default();
        // gpt-4o-mini has a text price but no realtime price
        assert!(matches!(
            table.realtime_rates("gpt-4o-mini"),
            Err(LedgerError::PricingMissing { modality: Modality::Realtime, .. })
        ));
    }

    #[test]
    fn mismatched_shape_is_pricing_missing() {
        let table = PricingTable::empty().with_price(
            "odd",
            Modality::Realtime,
            PriceSpec::Tokens(TokenRates::new(1.0, 1.0, 1.0)),
        );
        assert!(table.realtime_rates("odd").is_err());
    }

    #[test]
    fn pricing_file_format() {
        let json = r#"[
            {"model": "m1", "modality": "text",
             "price": {"kind": "tokens", "input": 1.0, "cached_input": 0.5, "output": 2.0}},
            {"model": "m2", "modality": "flat_rate",
             "price": {"kind": "per_generation", "cost_per_generation": 0.02}}
        ]"#;
        let table: PricingTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.token_rates("m1", Modality::Text).unwrap(),
            TokenRates::new(1.0, 0.5, 2.0)
        );
        assert!((table.cost_per_generation("m2").unwrap() - 0.02).abs() < 1e-12);

        let back: PricingTable =
            serde_json::from_str(&serde_json::to_string(&table).unwrap()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn credit_conversion_defaults() {
        let conversion = CreditConversion::default();
        // $0.01 * 1.5 / $0.05 = 0.3 credits
        assert!((conversion.credits_from_usd(0.01) - 0.3).abs() < 1e-12);
    }
}
