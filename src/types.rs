//! Core value types shared by every stage of the pipeline.

use crate::errors::PipelineError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Colour layout of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    Mono,
    Rgb,
}

impl ColorMode {
    pub fn channel_count(self) -> usize {
        match self {
            ColorMode::Mono => 1,
            ColorMode::Rgb => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColorMode::Mono => "Mono",
            ColorMode::Rgb => "RGB",
        }
    }
}

/// One acquired camera frame.
///
/// Samples are row-major and channel-interleaved. Two-byte samples are stored
/// big-endian, exactly as they arrive from the camera server. The sample
/// storage is reference counted, so cloning a frame to hand it to another
/// consumer does not copy pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    color_mode: ColorMode,
    bytes_per_sample: u8,
    samples: Bytes,
    capture_timestamp: DateTime<Utc>,
}

impl FrameBuffer {
    /// Wrap raw sample bytes, checking that they match the declared geometry.
    pub fn new(
        width: u32,
        height: u32,
        color_mode: ColorMode,
        bytes_per_sample: u8,
        samples: impl Into<Bytes>,
    ) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::invalid_argument(format!(
                "frame dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        if bytes_per_sample != 1 && bytes_per_sample != 2 {
            return Err(PipelineError::invalid_argument(format!(
                "bytes per sample must be 1 or 2, got {}",
                bytes_per_sample
            )));
        }

        let samples = samples.into();
        let expected = width as usize
            * height as usize
            * color_mode.channel_count()
            * bytes_per_sample as usize;
        if samples.len() != expected {
            return Err(PipelineError::invalid_argument(format!(
                "sample buffer is {} bytes, expected {} for {}x{} {} {}-bit",
                samples.len(),
                expected,
                width,
                height,
                color_mode.as_str(),
                bytes_per_sample as u32 * 8
            )));
        }

        Ok(Self {
            width,
            height,
            color_mode,
            bytes_per_sample,
            samples,
            capture_timestamp: Utc::now(),
        })
    }

    /// Build an 8-bit frame from sample values.
    pub fn from_u8(
        width: u32,
        height: u32,
        color_mode: ColorMode,
        samples: Vec<u8>,
    ) -> Result<Self, PipelineError> {
        Self::new(width, height, color_mode, 1, samples)
    }

    /// Build a 16-bit frame from sample values, encoding them big-endian.
    pub fn from_u16(
        width: u32,
        height: u32,
        color_mode: ColorMode,
        samples: &[u16],
    ) -> Result<Self, PipelineError> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
        Self::new(width, height, color_mode, 2, bytes)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.capture_timestamp = timestamp;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    pub fn channel_count(&self) -> usize {
        self.color_mode.channel_count()
    }

    pub fn bytes_per_sample(&self) -> u8 {
        self.bytes_per_sample
    }

    pub fn bit_depth(&self) -> u32 {
        self.bytes_per_sample as u32 * 8
    }

    pub fn samples(&self) -> &Bytes {
        &self.samples
    }

    pub fn capture_timestamp(&self) -> DateTime<Utc> {
        self.capture_timestamp
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn max_sample_value(&self) -> u32 {
        max_sample_value(self.bytes_per_sample)
    }

    /// Geometry used to detect display format changes between frames.
    pub fn format_key(&self) -> FrameFormat {
        FrameFormat {
            width: self.width,
            height: self.height,
            color_mode: self.color_mode,
            bytes_per_sample: self.bytes_per_sample,
        }
    }

    /// Sample value at a flat sample index (pixel * channels + channel).
    #[inline]
    pub fn sample_at(&self, index: usize) -> u32 {
        match self.bytes_per_sample {
            1 => self.samples[index] as u32,
            _ => {
                let offset = index * 2;
                u16::from_be_bytes([self.samples[offset], self.samples[offset + 1]]) as u32
            }
        }
    }

    #[inline]
    pub fn sample(&self, x: u32, y: u32, channel: usize) -> u32 {
        let pixel = y as usize * self.width as usize + x as usize;
        self.sample_at(pixel * self.channel_count() + channel)
    }

    /// Decoded sample values in storage order.
    pub fn sample_values(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.pixel_count() * self.channel_count()).map(move |i| self.sample_at(i))
    }
}

/// Largest representable sample for a given sample width.
pub fn max_sample_value(bytes_per_sample: u8) -> u32 {
    if bytes_per_sample == 1 {
        255
    } else {
        65535
    }
}

/// Geometry and sample format of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
    pub color_mode: ColorMode,
    pub bytes_per_sample: u8,
}

impl FrameFormat {
    pub fn max_sample_value(&self) -> u32 {
        max_sample_value(self.bytes_per_sample)
    }
}

/// Display-ready image, one `0xAARRGGBB` word per pixel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0xFF00_0000; width as usize * height as usize],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Convert to an RGBA image for export.
    pub fn to_rgba_image(&self) -> Option<image::RgbaImage> {
        let mut raw = Vec::with_capacity(self.pixels.len() * 4);
        for argb in &self.pixels {
            let [a, r, g, b] = argb.to_be_bytes();
            raw.extend_from_slice(&[r, g, b, a]);
        }
        image::RgbaImage::from_raw(self.width, self.height, raw)
    }
}

/// Pack an opaque ARGB pixel.
#[inline]
pub fn argb(r: u8, g: u8, b: u8) -> u32 {
    0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

/// Noise statistics for one colour channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelNoise {
    pub mean: f64,
    pub std_dev: f64,
    pub snr: f64,
}

impl ChannelNoise {
    /// SNR is reported as 0 when there is no measurable noise.
    pub fn from_moments(mean: f64, std_dev: f64) -> Self {
        let snr = if std_dev > 0.0 { mean / std_dev } else { 0.0 };
        Self { mean, std_dev, snr }
    }
}

/// Whether statistics come from one frame's pixel population or from a run
/// of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoiseKind {
    Spatial,
    Temporal { frames: usize },
}

/// Per-channel noise measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseSample {
    pub kind: NoiseKind,
    pub channels: Vec<ChannelNoise>,
    pub measured_at: DateTime<Utc>,
}

impl NoiseSample {
    pub fn new(kind: NoiseKind, channels: Vec<ChannelNoise>) -> Self {
        Self {
            kind,
            channels,
            measured_at: Utc::now(),
        }
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self.kind, NoiseKind::Temporal { .. })
    }
}
