//! Synthetic frames for offline testing
//!
//! Frames are a horizontal intensity ramp with deterministic pseudo-random
//! noise on top, so histograms are spread out and noise statistics are
//! non-zero without any camera attached.

use crate::acquisition::FrameSource;
use crate::errors::PipelineError;
use crate::types::{ColorMode, FrameBuffer};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shape of a synthetic frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticFrameSpec {
    pub width: u32,
    pub height: u32,
    pub color_mode: ColorMode,
    pub bytes_per_sample: u8,
    /// Peak-to-peak noise amplitude as a fraction of the sample range
    pub noise_amplitude: f64,
}

impl Default for SyntheticFrameSpec {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            color_mode: ColorMode::Mono,
            bytes_per_sample: 1,
            noise_amplitude: 0.02,
        }
    }
}

/// Create one synthetic frame. The same `frame_number` always yields the same
/// samples; consecutive numbers differ only in their noise.
pub fn synthetic_frame(
    spec: &SyntheticFrameSpec,
    frame_number: u64,
) -> Result<FrameBuffer, PipelineError> {
    let max = if spec.bytes_per_sample == 2 {
        u16::MAX as f64
    } else {
        u8::MAX as f64
    };
    let channels = spec.color_mode.channel_count();
    let mut rng = ChaCha8Rng::seed_from_u64(frame_number);
    let mut values = Vec::with_capacity((spec.width * spec.height) as usize * channels);

    for _y in 0..spec.height {
        for x in 0..spec.width {
            let ramp = if spec.width > 1 {
                x as f64 / (spec.width - 1) as f64
            } else {
                0.5
            };
            for channel in 0..channels {
                // Channels are scaled slightly differently so RGB is not grey.
                let level = ramp * (1.0 - 0.1 * channel as f64) * 0.8 + 0.1;
                let noise: f64 = rng.gen_range(-0.5..0.5);
                let noisy = (level + noise * spec.noise_amplitude) * max;
                values.push(noisy.round().clamp(0.0, max) as u16);
            }
        }
    }

    if spec.bytes_per_sample == 2 {
        FrameBuffer::from_u16(spec.width, spec.height, spec.color_mode, &values)
    } else {
        let bytes: Vec<u8> = values.iter().map(|&v| v as u8).collect();
        FrameBuffer::from_u8(spec.width, spec.height, spec.color_mode, bytes)
    }
}

/// A camera that always has a fresh synthetic frame.
#[derive(Debug)]
pub struct SyntheticSource {
    spec: SyntheticFrameSpec,
    frame_number: AtomicU64,
    streaming: AtomicBool,
}

impl SyntheticSource {
    pub fn new(spec: SyntheticFrameSpec) -> Self {
        Self {
            spec,
            frame_number: AtomicU64::new(0),
            streaming: AtomicBool::new(true),
        }
    }

    pub fn spec(&self) -> &SyntheticFrameSpec {
        &self.spec
    }

    /// Frames handed out so far.
    pub fn frames_served(&self) -> u64 {
        self.frame_number.load(Ordering::Relaxed)
    }
}

impl FrameSource for SyntheticSource {
    fn fetch_frame(&self) -> Result<Option<FrameBuffer>, PipelineError> {
        let n = self.frame_number.fetch_add(1, Ordering::Relaxed);
        synthetic_frame(&self.spec, n).map(Some)
    }

    fn is_streaming_active(&self) -> bool {
        self.streaming.load(Ordering::Relaxed)
    }

    fn set_streaming(&self, active: bool) -> Result<(), PipelineError> {
        self.streaming.store(active, Ordering::Relaxed);
        Ok(())
    }
}
