//! Per-channel noise statistics
//!
//! Two measurements are provided:
//! - **spatial**: mean and standard deviation over every pixel of one colour
//!   frame, computed continuously on the live feed (throttled);
//! - **temporal**: per-pixel mean and standard deviation across a short burst
//!   of frames, which separates sensor and readout noise from scene content.
//!   This one is requested on demand and blocks for the whole burst.

use crate::acquisition::FrameSource;
use crate::errors::PipelineError;
use crate::timing::Throttle;
use crate::types::{ChannelNoise, ColorMode, FrameBuffer, NoiseKind, NoiseSample};
use std::time::{Duration, Instant};

/// Default minimum spacing between spatial estimates (2 Hz).
pub const DEFAULT_SPATIAL_INTERVAL: Duration = Duration::from_millis(500);

/// Fewest frames a temporal estimate can be computed from.
pub const MIN_TEMPORAL_FRAMES: usize = 2;

#[derive(Debug)]
pub struct NoiseEstimator {
    throttle: Throttle,
}

impl NoiseEstimator {
    pub fn new(spatial_interval: Duration) -> Self {
        Self {
            throttle: Throttle::new(spatial_interval),
        }
    }

    /// Throttled spatial estimate for colour frames.
    ///
    /// Returns `None` for single-channel frames and for calls inside the
    /// throttle window.
    pub fn spatial_estimate(&mut self, frame: &FrameBuffer) -> Option<NoiseSample> {
        self.spatial_estimate_at(frame, Instant::now())
    }

    pub fn spatial_estimate_at(&mut self, frame: &FrameBuffer, now: Instant) -> Option<NoiseSample> {
        if frame.color_mode() != ColorMode::Rgb {
            return None;
        }
        if !self.throttle.try_acquire(now) {
            return None;
        }
        Some(spatial_noise(frame))
    }

    /// Fetch `frame_count` frames from `source` and measure temporal noise.
    ///
    /// Blocks for the duration of the burst; run it off the presentation
    /// thread. Any failure during the burst fails the whole measurement.
    pub fn temporal_estimate(
        source: &dyn FrameSource,
        frame_count: usize,
    ) -> Result<NoiseSample, PipelineError> {
        if frame_count < MIN_TEMPORAL_FRAMES {
            return Err(PipelineError::invalid_argument(format!(
                "temporal noise needs at least {} frames, got {}",
                MIN_TEMPORAL_FRAMES, frame_count
            )));
        }

        log::info!("Measuring temporal noise over {} frames", frame_count);
        let frames = source.fetch_frame_burst(frame_count).map_err(|e| {
            log::warn!("Temporal noise burst failed: {}", e);
            PipelineError::TemporalNoiseFailure {
                completed: e.completed,
                requested: frame_count,
                cause: e.error.to_string(),
            }
        })?;

        temporal_noise(&frames)
    }
}

/// Population statistics per channel over all pixels of one frame.
pub fn spatial_noise(frame: &FrameBuffer) -> NoiseSample {
    let channels = frame.channel_count();
    let mut sums = vec![0u64; channels];
    let mut sums_sq = vec![0u128; channels];

    for (index, value) in frame.sample_values().enumerate() {
        let channel = index % channels;
        sums[channel] += value as u64;
        sums_sq[channel] += (value as u128) * (value as u128);
    }

    let n = frame.pixel_count() as f64;
    let stats = sums
        .iter()
        .zip(&sums_sq)
        .map(|(&sum, &sum_sq)| {
            let mean = sum as f64 / n;
            // E[x^2] - E[x]^2 can dip below zero by rounding.
            let variance = (sum_sq as f64 / n - mean * mean).max(0.0);
            ChannelNoise::from_moments(mean, variance.sqrt())
        })
        .collect();

    NoiseSample::new(NoiseKind::Spatial, stats)
}

/// Temporal statistics per channel across `frames`.
///
/// Each pixel gets its own mean and (population) standard deviation over the
/// run. Per channel, the reported mean and standard deviation are the averages
/// of the per-pixel values, and the SNR is their ratio.
pub fn temporal_noise(frames: &[FrameBuffer]) -> Result<NoiseSample, PipelineError> {
    if frames.len() < MIN_TEMPORAL_FRAMES {
        return Err(PipelineError::invalid_argument(format!(
            "temporal noise needs at least {} frames, got {}",
            MIN_TEMPORAL_FRAMES,
            frames.len()
        )));
    }

    let format = frames[0].format_key();
    if let Some(odd) = frames.iter().find(|f| f.format_key() != format) {
        return Err(PipelineError::invalid_argument(format!(
            "burst changed format from {}x{} to {}x{}",
            format.width,
            format.height,
            odd.width(),
            odd.height()
        )));
    }

    let channels = frames[0].channel_count();
    let sample_count = frames[0].pixel_count() * channels;
    let mut sums = vec![0f64; sample_count];
    let mut sums_sq = vec![0f64; sample_count];

    for frame in frames {
        for (index, value) in frame.sample_values().enumerate() {
            let value = value as f64;
            sums[index] += value;
            sums_sq[index] += value * value;
        }
    }

    let n = frames.len() as f64;
    let mut mean_total = vec![0f64; channels];
    let mut std_total = vec![0f64; channels];
    for index in 0..sample_count {
        let mean = sums[index] / n;
        let variance = (sums_sq[index] / n - mean * mean).max(0.0);
        mean_total[index % channels] += mean;
        std_total[index % channels] += variance.sqrt();
    }

    let pixels = frames[0].pixel_count() as f64;
    let stats = mean_total
        .iter()
        .zip(&std_total)
        .map(|(&mean, &std_dev)| ChannelNoise::from_moments(mean / pixels, std_dev / pixels))
        .collect();

    Ok(NoiseSample::new(
        NoiseKind::Temporal {
            frames: frames.len(),
        },
        stats,
    ))
}
