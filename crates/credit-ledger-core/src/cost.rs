//! Conversion of usage into provider cost and credits.
//!
//! Each modality has its own cost function; all of them return USD first and
//! convert through the single [`CreditConversion`] so every modality shares
//! one exchange rate.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pricing::{CreditConversion, Modality, PricingTable, TokenRates, TOKENS_PER_RATE_UNIT};
use crate::usage::{TokenCounts, UsageEvent, UsagePayload};

/// The price of one usage event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    /// Provider cost before margin.
    pub usd: f64,
    /// Credits to charge.
    pub credits: f64,
}

/// USD cost of one token channel.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn token_cost_usd(rates: &TokenRates, tokens: &TokenCounts) -> f64 {
    (tokens.cached_input as f64 * rates.cached_input
        + tokens.input as f64 * rates.input
        + tokens.output as f64 * rates.output)
        / TOKENS_PER_RATE_UNIT
}

/// Prices usage events against an injected pricing table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostCalculator {
    pricing: PricingTable,
    conversion: CreditConversion,
}

impl CostCalculator {
    /// Create a calculator from a pricing table and credit conversion.
    #[must_use]
    pub const fn new(pricing: PricingTable, conversion: CreditConversion) -> Self {
        Self {
            pricing,
            conversion,
        }
    }

    /// The pricing table in use.
    #[must_use]
    pub const fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// The USD to credit conversion in use.
    #[must_use]
    pub const fn conversion(&self) -> &CreditConversion {
        &self.conversion
    }

    /// Convert a provider cost in USD to credits.
    #[must_use]
    pub fn credits_from_usd(&self, usd: f64) -> f64 {
        self.conversion.credits_from_usd(usd)
    }

    fn priced(&self, usd: f64) -> Cost {
        Cost {
            usd,
            credits: self.credits_from_usd(usd),
        }
    }

    /// Cost of a text generation.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::PricingMissing` if the model has no text price.
    pub fn text_model_cost(&self, model: &str, tokens: &TokenCounts) -> Result<Cost> {
        let rates = self.pricing.token_rates(model, Modality::Text)?;
        Ok(self.priced(token_cost_usd(&rates, tokens)))
    }

    /// Cost of realtime usage, summed over the text and audio channels.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::PricingMissing` if the model has no realtime price.
    pub fn realtime_cost(
        &self,
        model: &str,
        text: &TokenCounts,
        audio: &TokenCounts,
    ) -> Result<Cost> {
        let (text_rates, audio_rates) = self.pricing.realtime_rates(model)?;
        let usd = token_cost_usd(&text_rates, text) + token_cost_usd(&audio_rates, audio);
        Ok(self.priced(usd))
    }

    /// Cost of a token-billed image generation, summed over text and image
    /// channels.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::PricingMissing` if the model has no image price.
    pub fn image_cost(&self, model: &str, text: &TokenCounts, image: &TokenCounts) -> Result<Cost> {
        let (text_rates, image_rates) = self.pricing.image_rates(model)?;
        let usd = token_cost_usd(&text_rates, text) + token_cost_usd(&image_rates, image);
        Ok(self.priced(usd))
    }

    /// Cost of a transcription.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::PricingMissing` if the model has no transcription
    /// price.
    pub fn transcription_cost(&self, model: &str, tokens: &TokenCounts) -> Result<Cost> {
        let rates = self.pricing.token_rates(model, Modality::Transcription)?;
        Ok(self.priced(token_cost_usd(&rates, tokens)))
    }

    /// Cost of `units` flat-rate generations.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::PricingMissing` if the model has no flat rate.
    #[allow(clippy::cast_precision_loss)]
    pub fn flat_rate_cost(&self, model: &str, units: u64) -> Result<Cost> {
        let per_generation = self.pricing.cost_per_generation(model)?;
        Ok(self.priced(units as f64 * per_generation))
    }

    /// Cost of any usage event, dispatched on its modality.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::PricingMissing` if the event's model/modality pair
    /// is not priced. A missing price is never treated as zero cost.
    pub fn calculate_cost(&self, event: &UsageEvent) -> Result<Cost> {
        let model = event.model.as_str();
        match &event.payload {
            UsagePayload::Text { tokens } => self.text_model_cost(model, tokens),
            UsagePayload::Realtime { text, audio, .. } => self.realtime_cost(model, text, audio),
            UsagePayload::Image { text, image, .. } => self.image_cost(model, text, image),
            UsagePayload::Transcription { tokens, .. } => self.transcription_cost(model, tokens),
            UsagePayload::FlatRate { units } => self.flat_rate_cost(model, *units),
        }
    }
}
