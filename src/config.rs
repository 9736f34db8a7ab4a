//! Matcher configuration.
//!
//! Defaults follow the protocol's recommended transmission parameters: an
//! exchange lifetime of 247 seconds bounds how long a message ID may be
//! remembered for duplicate detection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::UnknownDeduplicator;

/// Default retention of duplicate-detection state.
pub const DEFAULT_EXCHANGE_LIFETIME: Duration = Duration::from_secs(247);
/// Default interval between mark-and-sweep passes.
pub const DEFAULT_MARK_AND_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
/// Default interval between crop-rotation generations.
pub const DEFAULT_CROP_ROTATION_PERIOD: Duration = Duration::from_secs(2);

/// Duplicate-detection strategy.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeduplicatorKind {
    /// Time-stamped entries removed by a periodic sweep.
    #[default]
    MarkAndSweep,
    /// Rotating generations of maps.
    CropRotation,
    /// No duplicate detection.
    None,
}

impl std::str::FromStr for DeduplicatorKind {
    type Err = UnknownDeduplicator;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "mark_and_sweep" | "mark-and-sweep" => Ok(Self::MarkAndSweep),
            "crop_rotation" | "crop-rotation" => Ok(Self::CropRotation),
            "none" => Ok(Self::None),
            other => Err(UnknownDeduplicator(other.to_owned())),
        }
    }
}

/// Settings consumed by [`Matcher`](crate::matcher::Matcher) and the
/// deduplicators it creates.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use coap_matcher::config::{DeduplicatorKind, MatcherConfig};
///
/// let config = MatcherConfig::default()
///     .use_random_mid_start(false)
///     .deduplicator(DeduplicatorKind::CropRotation)
///     .crop_rotation_period(Duration::from_millis(500));
/// assert!(!config.random_mid_start);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Seed the message ID counter randomly instead of starting at zero.
    pub random_mid_start: bool,
    /// Which deduplicator to create.
    pub deduplicator: DeduplicatorKind,
    /// How long a message ID is remembered.
    #[serde(with = "millis")]
    pub exchange_lifetime: Duration,
    /// Interval between mark-and-sweep passes.
    #[serde(with = "millis")]
    pub mark_and_sweep_interval: Duration,
    /// Interval between crop-rotation generations.
    #[serde(with = "millis")]
    pub crop_rotation_period: Duration,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            random_mid_start: true,
            deduplicator: DeduplicatorKind::default(),
            exchange_lifetime: DEFAULT_EXCHANGE_LIFETIME,
            mark_and_sweep_interval: DEFAULT_MARK_AND_SWEEP_INTERVAL,
            crop_rotation_period: DEFAULT_CROP_ROTATION_PERIOD,
        }
    }
}

impl MatcherConfig {
    /// Choose between a random and a zero initial message ID.
    #[must_use]
    pub fn use_random_mid_start(mut self, random: bool) -> Self {
        self.random_mid_start = random;
        self
    }

    /// Select the deduplicator.
    #[must_use]
    pub fn deduplicator(mut self, kind: DeduplicatorKind) -> Self {
        self.deduplicator = kind;
        self
    }

    /// Set the duplicate-detection retention window.
    #[must_use]
    pub fn exchange_lifetime(mut self, lifetime: Duration) -> Self {
        debug_assert!(!lifetime.is_zero(), "exchange lifetime must be non-zero");
        self.exchange_lifetime = lifetime;
        self
    }

    /// Set the mark-and-sweep interval.
    #[must_use]
    pub fn mark_and_sweep_interval(mut self, interval: Duration) -> Self {
        debug_assert!(!interval.is_zero(), "sweep interval must be non-zero");
        self.mark_and_sweep_interval = interval;
        self
    }

    /// Set the crop-rotation period.
    #[must_use]
    pub fn crop_rotation_period(mut self, period: Duration) -> Self {
        debug_assert!(!period.is_zero(), "rotation period must be non-zero");
        self.crop_rotation_period = period;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
