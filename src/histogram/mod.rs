//! Intensity histogram of live frames
//!
//! Every frame is reduced to a fixed 256-bin histogram over normalised
//! intensity. Single-channel frames are binned by sample value; colour frames
//! are binned by luminance. Updates are throttled so the histogram task never
//! runs more often than the configured interval.

use crate::check_invariant;
use crate::contrast::{ContrastModel, ContrastWindow};
use crate::invariants::HISTOGRAM_COUNTS_EVERY_PIXEL;
use crate::timing::Throttle;
use crate::types::{ColorMode, FrameBuffer};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const HISTOGRAM_BINS: usize = 256;

/// Default minimum spacing between histogram updates (5 Hz).
pub const DEFAULT_HISTOGRAM_INTERVAL: Duration = Duration::from_millis(200);

/// Rec. 601 luma weights in thousandths (0.299, 0.587, 0.114).
const LUMA_R: u64 = 299;
const LUMA_G: u64 = 587;
const LUMA_B: u64 = 114;
const LUMA_SCALE: u64 = 1000;

/// 256-bin count array over intensity normalised to `0..=255`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    bins: [u64; HISTOGRAM_BINS],
    total: u64,
}

impl Histogram {
    pub fn from_bins(bins: [u64; HISTOGRAM_BINS]) -> Self {
        let total = bins.iter().sum();
        Self { bins, total }
    }

    /// Bin every pixel of `frame`.
    pub fn from_frame(frame: &FrameBuffer) -> Self {
        let mut bins = [0u64; HISTOGRAM_BINS];
        let max = frame.max_sample_value() as u64;

        match frame.color_mode() {
            ColorMode::Mono => {
                for value in frame.sample_values() {
                    let bin = (value as u64 * 255 / max).min(255) as usize;
                    bins[bin] += 1;
                }
            }
            ColorMode::Rgb => {
                // Integer luma keeps white exactly in the top bin.
                let denominator = LUMA_SCALE * max;
                for pixel in 0..frame.pixel_count() {
                    let base = pixel * 3;
                    let luma = LUMA_R * frame.sample_at(base) as u64
                        + LUMA_G * frame.sample_at(base + 1) as u64
                        + LUMA_B * frame.sample_at(base + 2) as u64;
                    let bin = (luma * 255 / denominator).min(255) as usize;
                    bins[bin] += 1;
                }
            }
        }

        let histogram = Self::from_bins(bins);
        check_invariant!(
            histogram.total == frame.pixel_count() as u64,
            HISTOGRAM_COUNTS_EVERY_PIXEL,
            "Histogram::from_frame"
        );
        histogram
    }

    pub fn bins(&self) -> &[u64; HISTOGRAM_BINS] {
        &self.bins
    }

    pub fn bin(&self, index: usize) -> u64 {
        self.bins.get(index).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Largest bin count, for scaling a plot.
    pub fn max_count(&self) -> u64 {
        self.bins.iter().copied().max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Throttled histogram producer that feeds auto-scale.
///
/// One engine is owned by the histogram task category; its throttle state is
/// never touched from anywhere else.
#[derive(Debug)]
pub struct HistogramEngine {
    throttle: Throttle,
    contrast: Arc<ContrastModel>,
    latest: Option<Histogram>,
}

impl HistogramEngine {
    pub fn new(contrast: Arc<ContrastModel>, min_interval: Duration) -> Self {
        Self {
            throttle: Throttle::new(min_interval),
            contrast,
            latest: None,
        }
    }

    /// Bin `frame` and, if auto-scale is on, apply the resulting window.
    ///
    /// Returns `None` when the call is throttled; the previous histogram stays
    /// current in that case.
    pub fn update(&mut self, frame: &FrameBuffer) -> Option<Histogram> {
        self.update_at(frame, Instant::now())
    }

    pub fn update_at(&mut self, frame: &FrameBuffer, now: Instant) -> Option<Histogram> {
        let histogram = self.compute_at(frame, now)?;
        self.apply_auto_scale(&histogram, frame.max_sample_value());
        Some(histogram)
    }

    /// Throttled binning without touching the contrast model.
    pub fn compute_at(&mut self, frame: &FrameBuffer, now: Instant) -> Option<Histogram> {
        if !self.throttle.try_acquire(now) {
            log::trace!("Histogram update throttled");
            return None;
        }

        let histogram = Histogram::from_frame(frame);
        self.latest = Some(histogram.clone());
        Some(histogram)
    }

    /// Feed `histogram` to the contrast model when auto-scale is on.
    ///
    /// Returns the window the model holds afterwards.
    pub fn apply_auto_scale(&self, histogram: &Histogram, max_sample_value: u32) -> ContrastWindow {
        if self.contrast.auto_scale_enabled() {
            if let Some(window) = self.contrast.compute_auto_scale(histogram, max_sample_value) {
                log::debug!("Auto-scale window {}..={}", window.min, window.max);
                return window;
            }
        }
        self.contrast.snapshot()
    }

    /// The last histogram produced, if any.
    pub fn latest(&self) -> Option<&Histogram> {
        self.latest.as_ref()
    }

    pub fn reset(&mut self) {
        self.throttle.reset();
        self.latest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_eight_bit_bins_by_value() {
        let frame = FrameBuffer::from_u8(2, 2, ColorMode::Mono, vec![0, 0, 128, 255]).unwrap();
        let histogram = Histogram::from_frame(&frame);
        assert_eq!(histogram.bin(0), 2);
        assert_eq!(histogram.bin(128), 1);
        assert_eq!(histogram.bin(255), 1);
        assert_eq!(histogram.total(), 4);
    }

    #[test]
    fn test_sixteen_bit_rescales_to_byte_range() {
        let frame = FrameBuffer::from_u16(3, 1, ColorMode::Mono, &[0, 32768, 65535]).unwrap();
        let histogram = Histogram::from_frame(&frame);
        assert_eq!(histogram.bin(0), 1);
        assert_eq!(histogram.bin(127), 1);
        assert_eq!(histogram.bin(255), 1);
    }

    #[test]
    fn test_rgb_uses_luminance() {
        // Pure green at full scale: 0.587 * 255 = 149.685
        let frame = FrameBuffer::from_u8(1, 1, ColorMode::Rgb, vec![0, 255, 0]).unwrap();
        let histogram = Histogram::from_frame(&frame);
        assert_eq!(histogram.bin(149), 1);
        assert_eq!(histogram.total(), 1);
    }

    #[test]
    fn test_white_rgb_lands_in_top_bin() {
        let frame = FrameBuffer::from_u16(1, 1, ColorMode::Rgb, &[65535, 65535, 65535]).unwrap();
        let histogram = Histogram::from_frame(&frame);
        assert_eq!(histogram.bin(255), 1);
    }

    #[test]
    fn test_engine_throttles() {
        let contrast = Arc::new(ContrastModel::new());
        let mut engine = HistogramEngine::new(contrast, DEFAULT_HISTOGRAM_INTERVAL);
        let frame = FrameBuffer::from_u8(2, 2, ColorMode::Mono, vec![1, 2, 3, 4]).unwrap();
        let t0 = Instant::now();

        assert!(engine.update_at(&frame, t0).is_some());
        assert!(engine.update_at(&frame, t0 + Duration::from_millis(50)).is_none());
        assert!(engine.latest().is_some());
        assert!(engine
            .update_at(&frame, t0 + Duration::from_millis(200))
            .is_some());
    }

    #[test]
    fn test_engine_applies_auto_scale_only_when_enabled() {
        let contrast = Arc::new(ContrastModel::new());
        let mut engine = HistogramEngine::new(contrast.clone(), Duration::ZERO);
        let mut samples = vec![10u8; 999];
        samples.push(200);
        let frame = FrameBuffer::from_u8(1000, 1, ColorMode::Mono, samples).unwrap();

        engine.update(&frame);
        assert_eq!(contrast.snapshot().max, 255);

        contrast.set_auto_scale(true);
        engine.update(&frame);
        let window = contrast.snapshot();
        assert_eq!((window.min, window.max), (10, 200));
    }
}
