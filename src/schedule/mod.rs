//! Delivery scheduling.
//!
//! Every letter travels for a random time inside a [`DeliveryWindow`],
//! counted from a base time. The base is the previous letter's scheduled
//! delivery when that is still in the future, otherwise now, so letters
//! leave in the order they were posted.
//!
//! The random fraction comes from a [`SkewSampler`]. [`BetaSkew`] draws
//! from Beta(2, 5): most letters arrive early in the window, a few late.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, warn};

use crate::config::ScheduleConfig;
use crate::error::{PostError, Result};
use crate::model::letter::parse_timestamp;

/// Longest delivery offset accepted: ten years.
pub const MAX_OFFSET_SECS: i64 = 10 * 365 * 86_400;

/// Bounds of the delivery offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryWindow {
    min: Duration,
    max: Duration,
}

impl DeliveryWindow {
    /// Create a window from second bounds. `min` must be non-negative, not
    /// above `max`, and `max` at most [`MAX_OFFSET_SECS`].
    pub fn from_secs(min_secs: i64, max_secs: i64) -> Result<Self> {
        if min_secs < 0 || max_secs < min_secs || max_secs > MAX_OFFSET_SECS {
            return Err(PostError::Config(format!(
                "invalid delivery window [{min_secs}s, {max_secs}s]"
            )));
        }
        let min = Duration::try_seconds(min_secs);
        let max = Duration::try_seconds(max_secs);
        match (min, max) {
            (Some(min), Some(max)) => Ok(Self { min, max }),
            _ => Err(PostError::Config(format!(
                "delivery window [{min_secs}s, {max_secs}s] is out of range"
            ))),
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Self::from_secs(config.min_offset_secs, config.max_offset_secs)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Map a skew in [0, 1] linearly onto the window, truncated to whole seconds.
    pub fn offset_for(&self, skew: f64) -> Duration {
        let skew = if skew.is_nan() { 0.0 } else { skew.clamp(0.0, 1.0) };
        let span = (self.max - self.min).num_seconds() as f64;
        let secs = (span * skew) as i64;
        self.min + Duration::seconds(secs)
    }
}

impl Default for DeliveryWindow {
    fn default() -> Self {
        Self {
            min: Duration::days(1),
            max: Duration::days(3),
        }
    }
}

/// Source of the skew fraction. Values outside [0, 1] are clamped.
pub trait SkewSampler {
    fn sample(&self) -> f64;
}

/// Beta(2, 5) skew using the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct BetaSkew;

impl SkewSampler for BetaSkew {
    fn sample(&self) -> f64 {
        beta_2_5(&mut rand::thread_rng())
    }
}

/// Draw from Beta(2, 5).
///
/// For integer shapes, Beta(a, b) is the a-th smallest of a + b - 1
/// independent uniforms, so this is the second smallest of six.
pub fn beta_2_5<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let mut draws = [0.0f64; 6];
    for d in draws.iter_mut() {
        *d = rng.gen::<f64>();
    }
    draws.sort_by(|a, b| a.total_cmp(b));
    draws[1]
}

/// Base time for the next letter: `previous` if still ahead of `now`, else `now`.
pub fn base_time(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}

/// Compute the scheduled delivery time for a new letter.
///
/// `previous` is the stored scheduled time of the most recently received
/// letter still in transit. If it cannot be parsed the base falls back to
/// `now`; bad prior state never blocks a submission.
pub fn compute_delivery_time(
    previous: Option<&str>,
    now: DateTime<Utc>,
    window: &DeliveryWindow,
    sampler: &dyn SkewSampler,
) -> DateTime<Utc> {
    let previous = previous.and_then(|raw| match parse_timestamp(raw) {
        Ok(ts) => Some(ts),
        Err(e) => {
            warn!(value = raw, error = %e, "Ignoring unparseable previous schedule");
            None
        }
    });
    let base = base_time(previous, now);
    let skew = sampler.sample();
    let offset = window.offset_for(skew);
    let scheduled = base
        .checked_add_signed(offset)
        .or_else(|| now.checked_add_signed(offset))
        .unwrap_or_else(|| {
            warn!(%base, "Delivery time out of range; delivering at base");
            base
        });
    debug!(%base, skew, %scheduled, "Computed delivery time");
    scheduled
}
