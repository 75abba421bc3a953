//! Display contrast window
//!
//! The window maps a range of raw sample values onto the full display
//! brightness range. It is written from two places (user interaction and the
//! histogram task when auto-scale is on) and read by the presentation thread,
//! so every field is an independent atomic. No lock is ever taken.
//!
//! A reader may observe a fresh `min` paired with a stale `max` while an
//! auto-scale update is in flight. That pairing is still a usable window and
//! the next render corrects itself.

use crate::check_invariant;
use crate::histogram::{Histogram, HISTOGRAM_BINS};
use crate::invariants::{CONTRAST_WINDOW_IN_RANGE, CONTRAST_WINDOW_ORDERED};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Default lower clip point for auto-scale, in percent of all samples.
pub const DEFAULT_LOW_PERCENTILE: f64 = 0.1;
/// Default upper clip point for auto-scale, in percent of all samples.
pub const DEFAULT_HIGH_PERCENTILE: f64 = 99.9;

/// A `(min, max)` display window plus the auto-scale flag at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContrastWindow {
    pub min: u32,
    pub max: u32,
    pub auto_scale: bool,
}

impl ContrastWindow {
    /// Width of the window, never less than 1.
    pub fn span(&self) -> u32 {
        self.max.saturating_sub(self.min).max(1)
    }
}

#[derive(Debug)]
pub struct ContrastModel {
    display_min: AtomicU32,
    display_max: AtomicU32,
    auto_scale: AtomicBool,
    low_percentile: f64,
    high_percentile: f64,
}

impl Default for ContrastModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ContrastModel {
    /// Full 8-bit range, auto-scale off, default clip percentiles.
    pub fn new() -> Self {
        Self::with_percentiles(DEFAULT_LOW_PERCENTILE, DEFAULT_HIGH_PERCENTILE)
    }

    pub fn with_percentiles(low_percentile: f64, high_percentile: f64) -> Self {
        Self {
            display_min: AtomicU32::new(0),
            display_max: AtomicU32::new(255),
            auto_scale: AtomicBool::new(false),
            low_percentile,
            high_percentile,
        }
    }

    /// Set the window directly and leave auto-scale mode.
    ///
    /// The caller clamps the bounds to the current sample range; this does not
    /// know the bit depth of the frame on screen.
    pub fn set_explicit(&self, min: u32, max: u32) {
        self.auto_scale.store(false, Ordering::Release);
        self.store_window(min, max);
    }

    /// Reset to `(0, max_sample_value)` and leave auto-scale mode.
    pub fn apply_full_range(&self, max_sample_value: u32) {
        self.auto_scale.store(false, Ordering::Release);
        self.store_window(0, max_sample_value);
        log::debug!("Contrast reset to full range 0..={}", max_sample_value);
    }

    /// Reset to `(0, max_sample_value)` keeping the auto-scale flag as is.
    pub fn reset_window(&self, max_sample_value: u32) {
        self.store_window(0, max_sample_value);
    }

    pub fn set_auto_scale(&self, enabled: bool) {
        self.auto_scale.store(enabled, Ordering::Release);
    }

    pub fn auto_scale_enabled(&self) -> bool {
        self.auto_scale.load(Ordering::Acquire)
    }

    /// Derive a percentile window from `histogram` and store it.
    ///
    /// Returns the window as stored, or `None` (state untouched) when the
    /// histogram is empty. The auto-scale flag is not changed.
    pub fn compute_auto_scale(
        &self,
        histogram: &Histogram,
        max_sample_value: u32,
    ) -> Option<ContrastWindow> {
        let (min, max) = auto_scale_window(
            histogram,
            max_sample_value,
            self.low_percentile,
            self.high_percentile,
        )?;

        check_invariant!(
            min <= max_sample_value && max <= max_sample_value,
            CONTRAST_WINDOW_IN_RANGE,
            "ContrastModel::compute_auto_scale"
        );
        let (min, max) = self.store_window(min, max);
        Some(ContrastWindow {
            min,
            max,
            auto_scale: self.auto_scale_enabled(),
        })
    }

    /// Read the current window. See the module docs for the consistency
    /// guarantees of this read.
    pub fn snapshot(&self) -> ContrastWindow {
        ContrastWindow {
            min: self.display_min.load(Ordering::Acquire),
            max: self.display_max.load(Ordering::Acquire),
            auto_scale: self.auto_scale.load(Ordering::Acquire),
        }
    }

    fn store_window(&self, min: u32, max: u32) -> (u32, u32) {
        let min = min.min(u32::MAX - 1);
        let max = if max <= min { min + 1 } else { max };
        check_invariant!(max > min, CONTRAST_WINDOW_ORDERED, "ContrastModel::store_window");
        self.display_min.store(min, Ordering::Release);
        self.display_max.store(max, Ordering::Release);
        (min, max)
    }
}

/// Percentile contrast window for a 256-bin histogram.
///
/// `low` is the first bin whose cumulative count reaches `low_percentile` of
/// all samples. `high` is the first bin above which fewer than
/// `100 - high_percentile` percent of the samples remain. Both bins are mapped
/// back to the sample domain with `bin * max_sample_value / 255`. A collapsed
/// window is widened to one sample value, staying inside the sample range.
///
/// Returns `None` for an empty histogram.
pub fn auto_scale_window(
    histogram: &Histogram,
    max_sample_value: u32,
    low_percentile: f64,
    high_percentile: f64,
) -> Option<(u32, u32)> {
    let total = histogram.total();
    if total == 0 {
        log::trace!("Skipping auto-scale for empty histogram");
        return None;
    }

    let low_target = total as f64 * low_percentile / 100.0;
    let high_tail = total as f64 * (100.0 - high_percentile) / 100.0;

    let mut low_bin = None;
    let mut high_bin = HISTOGRAM_BINS - 1;
    let mut cumulative = 0u64;
    for (bin, &count) in histogram.bins().iter().enumerate() {
        cumulative += count;
        if cumulative == 0 {
            continue;
        }
        if low_bin.is_none() && cumulative as f64 >= low_target {
            low_bin = Some(bin);
        }
        if ((total - cumulative) as f64) < high_tail || cumulative == total {
            high_bin = bin;
            break;
        }
    }
    let low_bin = low_bin.unwrap_or(0);

    let to_sample = |bin: usize| (bin as u64 * max_sample_value as u64 / 255) as u32;
    let mut min = to_sample(low_bin);
    let mut max = to_sample(high_bin);

    if max <= min {
        if min >= max_sample_value {
            min = max_sample_value.saturating_sub(1);
            max = max_sample_value;
        } else {
            max = min + 1;
        }
    }

    Some((min, max))
}
