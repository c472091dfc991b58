//! Usage events and per-model running aggregates.
//!
//! Producers (realtime sessions, image generations, assessment generations)
//! report one [`UsageEvent`] per completed operation. The ledger folds each
//! event into a [`ModelUsageAggregate`] selected by [`UsageKey`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::Cost;
use crate::pricing::Modality;

/// Token counts for one channel, split the way providers bill them.
///
/// Absent counts deserialize as zero: "no tokens of this kind" is valid usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    /// Input tokens served from the provider cache.
    #[serde(default)]
    pub cached_input: u64,
    /// Input tokens not served from cache.
    #[serde(default)]
    pub input: u64,
    /// Output tokens.
    #[serde(default)]
    pub output: u64,
}

impl TokenCounts {
    /// Create token counts.
    #[must_use]
    pub const fn new(cached_input: u64, input: u64, output: u64) -> Self {
        Self {
            cached_input,
            input,
            output,
        }
    }

    /// Sum of all three counts.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.cached_input
            .saturating_add(self.input)
            .saturating_add(self.output)
    }

    /// Field-wise sum.
    #[must_use]
    pub const fn plus(&self, other: &Self) -> Self {
        Self {
            cached_input: self.cached_input.saturating_add(other.cached_input),
            input: self.input.saturating_add(other.input),
            output: self.output.saturating_add(other.output),
        }
    }
}

/// Requested image quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageQuality {
    /// Low quality.
    Low,
    /// Medium quality.
    Medium,
    /// High quality.
    High,
}

/// Requested image aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSize {
    /// 1024x1024.
    Square,
    /// 1024x1536.
    Portrait,
    /// 1536x1024.
    Landscape,
}

/// Modality-specific quantities of a usage event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "modality", rename_all = "snake_case")]
pub enum UsagePayload {
    /// Text generation.
    Text {
        /// Token counts.
        #[serde(default)]
        tokens: TokenCounts,
    },

    /// A realtime voice session (or one response within it).
    Realtime {
        /// Text channel tokens.
        #[serde(default)]
        text: TokenCounts,
        /// Audio channel tokens.
        #[serde(default)]
        audio: TokenCounts,
        /// Session length covered by this event.
        #[serde(default)]
        session_seconds: f64,
        /// Characters transcribed from the user.
        #[serde(default)]
        user_chars: u64,
        /// Characters spoken by the assistant.
        #[serde(default)]
        assistant_chars: u64,
    },

    /// Token-billed image generation.
    Image {
        /// Requested quality.
        quality: ImageQuality,
        /// Requested size.
        size: ImageSize,
        /// Prompt text tokens.
        #[serde(default)]
        text: TokenCounts,
        /// Image tokens (input images and generated output).
        #[serde(default)]
        image: TokenCounts,
        /// Images produced by the request.
        #[serde(default)]
        image_count: u64,
    },

    /// Speech-to-text.
    Transcription {
        /// Token counts (audio input, text output).
        #[serde(default)]
        tokens: TokenCounts,
        /// Length of the transcribed audio.
        #[serde(default)]
        audio_seconds: f64,
    },

    /// Generations billed at a fixed price per unit.
    FlatRate {
        /// Units generated.
        #[serde(default)]
        units: u64,
    },
}

impl UsagePayload {
    /// The pricing modality of this payload.
    #[must_use]
    pub const fn modality(&self) -> Modality {
        match self {
            Self::Text { .. } => Modality::Text,
            Self::Realtime { .. } => Modality::Realtime,
            Self::Image { .. } => Modality::Image,
            Self::Transcription { .. } => Modality::Transcription,
            Self::FlatRate { .. } => Modality::FlatRate,
        }
    }
}

/// A single metered operation, reported when it completes.
///
/// Events are never stored on their own; they are folded into aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Model that served the operation.
    pub model: String,

    /// What was consumed.
    pub payload: UsagePayload,

    /// Wall-clock duration of the operation.
    #[serde(default)]
    pub elapsed_seconds: f64,

    /// When the operation completed.
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl UsageEvent {
    /// Create an event for an arbitrary payload.
    #[must_use]
    pub fn new(model: impl Into<String>, payload: UsagePayload) -> Self {
        Self {
            model: model.into(),
            payload,
            elapsed_seconds: 0.0,
            occurred_at: Utc::now(),
        }
    }

    /// Create a text generation event.
    #[must_use]
    pub fn text(model: impl Into<String>, tokens: TokenCounts) -> Self {
        Self::new(model, UsagePayload::Text { tokens })
    }

    /// Create a realtime event from text and audio token counts.
    #[must_use]
    pub fn realtime(model: impl Into<String>, text: TokenCounts, audio: TokenCounts) -> Self {
        Self::new(
            model,
            UsagePayload::Realtime {
                text,
                audio,
                session_seconds: 0.0,
                user_chars: 0,
                assistant_chars: 0,
            },
        )
    }

    /// Create an image generation event.
    #[must_use]
    pub fn image(
        model: impl Into<String>,
        quality: ImageQuality,
        size: ImageSize,
        text: TokenCounts,
        image: TokenCounts,
        image_count: u64,
    ) -> Self {
        Self::new(
            model,
            UsagePayload::Image {
                quality,
                size,
                text,
                image,
                image_count,
            },
        )
    }

    /// Create a transcription event.
    #[must_use]
    pub fn transcription(
        model: impl Into<String>,
        tokens: TokenCounts,
        audio_seconds: f64,
    ) -> Self {
        Self::new(
            model,
            UsagePayload::Transcription {
                tokens,
                audio_seconds,
            },
        )
    }

    /// Create a flat-rate generation event.
    #[must_use]
    pub fn flat_rate(model: impl Into<String>, units: u64) -> Self {
        Self::new(model, UsagePayload::FlatRate { units })
    }

    /// Set the elapsed wall-clock time.
    #[must_use]
    pub fn with_elapsed(mut self, seconds: f64) -> Self {
        self.elapsed_seconds = seconds;
        self
    }

    /// Set the completion timestamp.
    #[must_use]
    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// The pricing modality of the event.
    #[must_use]
    pub const fn modality(&self) -> Modality {
        self.payload.modality()
    }
}

/// Selects the aggregate an event is folded into.
///
/// Images are grouped per quality and size. All flat-rate generations of a
/// period share the single [`UsageKey::FlatRate`] aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsageKey {
    /// Text generation per model.
    Text {
        /// Model name.
        model: String,
    },
    /// Realtime sessions per model.
    Realtime {
        /// Model name.
        model: String,
    },
    /// Image generation per model, quality and size.
    Image {
        /// Model name.
        model: String,
        /// Image quality.
        quality: ImageQuality,
        /// Image size.
        size: ImageSize,
    },
    /// Transcription per model.
    Transcription {
        /// Model name.
        model: String,
    },
    /// All flat-rate generations.
    FlatRate,
}

impl UsageKey {
    /// The aggregate key for an event.
    #[must_use]
    pub fn for_event(event: &UsageEvent) -> Self {
        let model = event.model.clone();
        match &event.payload {
            UsagePayload::Text { .. } => Self::Text { model },
            UsagePayload::Realtime { .. } => Self::Realtime { model },
            UsagePayload::Image { quality, size, .. } => Self::Image {
                model,
                quality: *quality,
                size: *size,
            },
            UsagePayload::Transcription { .. } => Self::Transcription { model },
            UsagePayload::FlatRate { .. } => Self::FlatRate,
        }
    }

    /// The modality bucket the key belongs to.
    #[must_use]
    pub const fn modality(&self) -> Modality {
        match self {
            Self::Text { .. } => Modality::Text,
            Self::Realtime { .. } => Modality::Realtime,
            Self::Image { .. } => Modality::Image,
            Self::Transcription { .. } => Modality::Transcription,
            Self::FlatRate => Modality::FlatRate,
        }
    }
}

/// Running totals for one [`UsageKey`] within one period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsageAggregate {
    /// Number of events folded in.
    pub request_count: u64,
    /// Text channel token sums.
    pub text: TokenCounts,
    /// Audio or image channel token sums.
    pub media: TokenCounts,
    /// Characters transcribed from users.
    pub user_chars: u64,
    /// Characters spoken by the assistant.
    pub assistant_chars: u64,
    /// Realtime session or transcribed audio seconds.
    pub session_seconds: f64,
    /// Images or flat-rate units generated.
    pub unit_count: u64,
    /// Provider cost before margin.
    pub total_cost_usd: f64,
    /// Credits charged.
    pub total_credits: f64,
    /// Request-weighted mean of elapsed time.
    pub mean_elapsed_seconds: f64,
    /// Longest elapsed time seen.
    pub max_elapsed_seconds: f64,
    /// Model of the most recent event.
    pub last_model: Option<String>,
    /// Timestamp of the most recent event.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Fold one event and its computed cost into an aggregate.
///
/// Additive fields are summed, the elapsed-time mean is weighted by request
/// count, and the maximum is kept. The fold is not idempotent: applying the
/// same event twice counts it twice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fold_usage(
    aggregate: &ModelUsageAggregate,
    event: &UsageEvent,
    cost: &Cost,
) -> ModelUsageAggregate {
    let mut next = aggregate.clone();
    let elapsed = event.elapsed_seconds.max(0.0);

    let old_count = aggregate.request_count;
    next.request_count = old_count + 1;
    next.mean_elapsed_seconds = (aggregate.mean_elapsed_seconds * old_count as f64 + elapsed)
        / next.request_count as f64;
    next.max_elapsed_seconds = aggregate.max_elapsed_seconds.max(elapsed);

    match &event.payload {
        UsagePayload::Text { tokens } => {
            next.text = next.text.plus(tokens);
        }
        UsagePayload::Realtime {
            text,
            audio,
            session_seconds,
            user_chars,
            assistant_chars,
        } => {
            next.text = next.text.plus(text);
            next.media = next.media.plus(audio);
            next.session_seconds += session_seconds.max(0.0);
            next.user_chars = next.user_chars.saturating_add(*user_chars);
            next.assistant_chars = next.assistant_chars.saturating_add(*assistant_chars);
        }
        UsagePayload::Image {
            text,
            image,
            image_count,
            ..
        } => {
            next.text = next.text.plus(text);
            next.media = next.media.plus(image);
            next.unit_count = next.unit_count.saturating_add(*image_count);
        }
        UsagePayload::Transcription {
            tokens,
            audio_seconds,
        } => {
            next.text = next.text.plus(tokens);
            next.session_seconds += audio_seconds.max(0.0);
        }
        UsagePayload::FlatRate { units } => {
            next.unit_count = next.unit_count.saturating_add(*units);
        }
    }

    next.total_cost_usd += cost.usd;
    next.total_credits += cost.credits;
    next.last_model = Some(event.model.clone());
    next.last_updated = Some(event.occurred_at);
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cost(usd: f64) -> Cost {
        Cost {
            usd,
            credits: usd * 30.0,
        }
    }

    #[test]
    fn running_mean_and_max() {
        let empty = ModelUsageAggregate::default();
        let first = UsageEvent::flat_rate("flux", 1).with_elapsed(2.0);
        let second = UsageEvent::flat_rate("flux", 1).with_elapsed(4.0);

        let agg = fold_usage(&empty, &first, &cost(0.02));
        let agg = fold_usage(&agg, &second, &cost(0.02));

        assert_eq!(agg.request_count, 2);
        assert!((agg.mean_elapsed_seconds - 3.0).abs() < 1e-9);
        assert_eq!(agg.max_elapsed_seconds, 4.0);
    }

    #[test]
    fn mean_is_weighted_by_request_count() {
        let mut agg = ModelUsageAggregate::default();
        for secs in [1.0, 1.0, 1.0] {
            agg = fold_usage(&agg, &UsageEvent::flat_rate("m", 1).with_elapsed(secs), &cost(0.0));
        }
        agg = fold_usage(&agg, &UsageEvent::flat_rate("m", 1).with_elapsed(5.0), &cost(0.0));
        // (1 + 1 + 1 + 5) / 4, not (1 + 5) / 2
        assert!((agg.mean_elapsed_seconds - 2.0).abs() < 1e-9);
    }

    #[test]
    fn flat_rate_image_totals() {
        // Two requests of 1 and 2 images at $0.02 per image.
        let empty = ModelUsageAggregate::default();
        let agg = fold_usage(&empty, &UsageEvent::flat_rate("replicate", 1), &cost(0.02));
        let agg = fold_usage(&agg, &UsageEvent::flat_rate("replicate", 2), &cost(0.04));

        assert!((agg.total_cost_usd - 0.06).abs() < 1e-9);
        assert_eq!(agg.unit_count, 3);
        assert_eq!(agg.request_count, 2);
    }

    #[test]
    fn realtime_sums_both_channels() {
        let mut event = UsageEvent::realtime(
            "rt",
            TokenCounts::new(10, 20, 30),
            TokenCounts::new(1, 2, 3),
        );
        if let UsagePayload::Realtime {
            session_seconds,
            user_chars,
            assistant_chars,
            ..
        } = &mut event.payload
        {
            *session_seconds = 12.5;
            *user_chars = 40;
            *assistant_chars = 60;
        }

        let agg = fold_usage(&ModelUsageAggregate::default(), &event, &cost(0.1));
        let agg = fold_usage(&agg, &event, &cost(0.1));

        assert_eq!(agg.text, TokenCounts::new(20, 40, 60));
        assert_eq!(agg.media, TokenCounts::new(2, 4, 6));
        assert!((agg.session_seconds - 25.0).abs() < 1e-9);
        assert_eq!(agg.user_chars, 80);
        assert_eq!(agg.assistant_chars, 120);
        assert!((agg.total_credits - 6.0).abs() < 1e-9);
    }

    #[test]
    fn image_events_sum_tokens_and_images() {
        let event = |count, secs| {
            UsageEvent::image(
                "gpt-image-1",
                ImageQuality::Medium,
                ImageSize::Square,
                TokenCounts::new(0, 50, 0),
                TokenCounts::new(0, 0, 1056),
                count,
            )
            .with_elapsed(secs)
        };
        let first = event(1, 6.0);
        let second = event(2, 10.0);
        assert_eq!(UsageKey::for_event(&first), UsageKey::for_event(&second));

        let agg = fold_usage(&ModelUsageAggregate::default(), &first, &cost(0.04));
        let agg = fold_usage(&agg, &second, &cost(0.08));

        assert_eq!(agg.request_count, 2);
        assert_eq!(agg.unit_count, 3);
        assert_eq!(agg.text, TokenCounts::new(0, 100, 0));
        assert_eq!(agg.media, TokenCounts::new(0, 0, 2112));
        assert!((agg.mean_elapsed_seconds - 8.0).abs() < 1e-9);
        assert_eq!(agg.max_elapsed_seconds, 10.0);
        assert!((agg.total_cost_usd - 0.12).abs() < 1e-9);
        assert_eq!(agg.last_model.as_deref(), Some("gpt-image-1"));
    }

    #[test]
    fn transcription_events_sum_audio_seconds() {
        let first = UsageEvent::transcription("whisper-1", TokenCounts::new(0, 200, 40), 30.0)
            .with_elapsed(1.0);
        let second = UsageEvent::transcription("whisper-1", TokenCounts::new(0, 100, 20), 12.5)
            .with_elapsed(3.0);

        let agg = fold_usage(&ModelUsageAggregate::default(), &first, &cost(0.01));
        let agg = fold_usage(&agg, &second, &cost(0.005));

        assert_eq!(agg.request_count, 2);
        assert_eq!(agg.text, TokenCounts::new(0, 300, 60));
        assert!((agg.session_seconds - 42.5).abs() < 1e-9);
        assert!((agg.mean_elapsed_seconds - 2.0).abs() < 1e-9);
        assert_eq!(agg.max_elapsed_seconds, 3.0);
        assert_eq!(agg.unit_count, 0);
        assert!((agg.total_credits - 0.45).abs() < 1e-9);
    }

    #[test]
    fn fold_leaves_input_untouched() {
        let base = ModelUsageAggregate::default();
        let _ = fold_usage(&base, &UsageEvent::text("m", TokenCounts::new(0, 5, 5)), &cost(1.0));
        assert_eq!(base, ModelUsageAggregate::default());
    }

    #[test]
    fn negative_elapsed_counts_as_zero() {
        let agg = fold_usage(
            &ModelUsageAggregate::default(),
            &UsageEvent::flat_rate("m", 1).with_elapsed(-3.0),
            &cost(0.0),
        );
        assert_eq!(agg.mean_elapsed_seconds, 0.0);
        assert_eq!(agg.max_elapsed_seconds, 0.0);
    }

    #[test]
    fn image_keys_group_by_quality_and_size() {
        let medium_square = UsageEvent::image(
            "gpt-image-1",
            ImageQuality::Medium,
            ImageSize::Square,
            TokenCounts::default(),
            TokenCounts::default(),
            1,
        );
        let high_square = UsageEvent::image(
            "gpt-image-1",
            ImageQuality::High,
            ImageSize::Square,
            TokenCounts::default(),
            TokenCounts::default(),
            1,
        );
        assert_ne!(UsageKey::for_event(&medium_square), UsageKey::for_event(&high_square));
        assert_eq!(UsageKey::for_event(&medium_square).modality(), Modality::Image);
    }

    #[test]
    fn flat_rate_models_share_one_key() {
        let a = UsageEvent::flat_rate("black-forest-labs/flux-schnell", 1);
        let b = UsageEvent::flat_rate("black-forest-labs/flux-1.1-pro", 1);
        assert_eq!(UsageKey::for_event(&a), UsageKey::FlatRate);
        assert_eq!(UsageKey::for_event(&a), UsageKey::for_event(&b));
    }

    #[test]
    fn missing_token_fields_default_to_zero() {
        let json = r#"{"model": "gpt-4o-mini", "payload": {"modality": "text", "tokens": {"output": 7}}}"#;
        let event: UsageEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event.payload,
            UsagePayload::Text {
                tokens: TokenCounts::new(0, 0, 7)
            }
        );
        assert_eq!(event.elapsed_seconds, 0.0);
    }
}
