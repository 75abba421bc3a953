//! Raw frame to display pixels
//!
//! Maps each sample through the contrast window onto `0..=255` and packs the
//! result into opaque ARGB. When the display is smaller (or larger) than the
//! sensor, destination pixels pick the nearest source pixel; nothing is
//! interpolated, so every displayed value is a real sensor reading.

use crate::contrast::ContrastWindow;
use crate::types::{argb, ColorMode, FrameBuffer, PixelBuffer};

/// Stateful renderer that reuses its output buffer between frames.
///
/// The buffer is reallocated only when the target size changes.
#[derive(Debug, Default)]
pub struct FrameRenderer {
    buffer: PixelBuffer,
    column_map: Vec<u32>,
    row_map: Vec<u32>,
    mapped_for: Option<(u32, u32, u32, u32)>,
    allocations: u64,
}

impl FrameRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render `frame` at `target_width` x `target_height`.
    ///
    /// A zero-area target yields an empty buffer.
    pub fn render(
        &mut self,
        frame: &FrameBuffer,
        window: &ContrastWindow,
        target_width: u32,
        target_height: u32,
    ) -> &PixelBuffer {
        if target_width == 0 || target_height == 0 {
            if !self.buffer.is_empty() {
                self.buffer = PixelBuffer::default();
            }
            return &self.buffer;
        }

        if self.buffer.width != target_width || self.buffer.height != target_height {
            self.buffer = PixelBuffer::new(target_width, target_height);
            self.allocations += 1;
            log::debug!("Render buffer resized to {}x{}", target_width, target_height);
        }
        self.update_sampling_maps(frame, target_width, target_height);

        let lut = ContrastLut::new(window);
        let stride = frame.width() as usize;
        let out_width = target_width as usize;

        for (dy, &sy) in self.row_map.iter().enumerate() {
            let out_row = &mut self.buffer.pixels[dy * out_width..(dy + 1) * out_width];
            let row_base = sy as usize * stride;
            match frame.color_mode() {
                ColorMode::Mono => {
                    for (out, &sx) in out_row.iter_mut().zip(&self.column_map) {
                        let v = lut.map(frame.sample_at(row_base + sx as usize));
                        *out = argb(v, v, v);
                    }
                }
                ColorMode::Rgb => {
                    for (out, &sx) in out_row.iter_mut().zip(&self.column_map) {
                        let base = (row_base + sx as usize) * 3;
                        *out = argb(
                            lut.map(frame.sample_at(base)),
                            lut.map(frame.sample_at(base + 1)),
                            lut.map(frame.sample_at(base + 2)),
                        );
                    }
                }
            }
        }

        &self.buffer
    }

    /// Render at the frame's native size.
    pub fn render_native(&mut self, frame: &FrameBuffer, window: &ContrastWindow) -> &PixelBuffer {
        self.render(frame, window, frame.width(), frame.height())
    }

    /// Number of times the output buffer has been (re)allocated.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    fn update_sampling_maps(&mut self, frame: &FrameBuffer, target_width: u32, target_height: u32) {
        let key = (frame.width(), frame.height(), target_width, target_height);
        if self.mapped_for == Some(key) {
            return;
        }
        self.column_map = nearest_indices(frame.width(), target_width);
        self.row_map = nearest_indices(frame.height(), target_height);
        self.mapped_for = Some(key);
    }
}

/// Source index for each destination index: `floor(d / scale)` clamped to
/// the source range.
fn nearest_indices(source: u32, target: u32) -> Vec<u32> {
    // d / (target / source) in exact integer arithmetic.
    (0..target as u64)
        .map(|d| ((d * source as u64 / target as u64) as u32).min(source - 1))
        .collect()
}

/// Linear window mapping `[min, max]` onto `0..=255`, rounded to nearest.
struct ContrastLut {
    min: u64,
    span: u64,
}

impl ContrastLut {
    fn new(window: &ContrastWindow) -> Self {
        Self {
            min: window.min as u64,
            span: window.span() as u64,
        }
    }

    #[inline]
    fn map(&self, value: u32) -> u8 {
        let offset = (value as u64).saturating_sub(self.min);
        ((offset * 255 + self.span / 2) / self.span).min(255) as u8
    }
}

/// Map a single sample value through a window.
pub fn map_sample(value: u32, window: &ContrastWindow) -> u8 {
    ContrastLut::new(window).map(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(min: u32, max: u32) -> ContrastWindow {
        ContrastWindow {
            min,
            max,
            auto_scale: false,
        }
    }

    #[test]
    fn test_map_sample_clamps() {
        let w = window(100, 200);
        assert_eq!(map_sample(50, &w), 0);
        assert_eq!(map_sample(100, &w), 0);
        assert_eq!(map_sample(200, &w), 255);
        assert_eq!(map_sample(60000, &w), 255);
        assert_eq!(map_sample(150, &w), 128);
    }

    #[test]
    fn test_mono_replicates_into_rgb() {
        let frame = FrameBuffer::from_u8(2, 1, ColorMode::Mono, vec![0, 255]).unwrap();
        let mut renderer = FrameRenderer::new();
        let out = renderer.render_native(&frame, &window(0, 255));
        assert_eq!(out.pixels, vec![0xFF00_0000, 0xFFFF_FFFF]);
    }

    #[test]
    fn test_downscale_uses_nearest_source_pixel() {
        // 4x1 source, 2x1 target: destination 0 -> source 0, 1 -> source 2.
        let frame = FrameBuffer::from_u8(4, 1, ColorMode::Mono, vec![10, 20, 30, 40]).unwrap();
        let mut renderer = FrameRenderer::new();
        let out = renderer.render(&frame, &window(0, 255), 2, 1);
        assert_eq!(out.pixels, vec![argb(10, 10, 10), argb(30, 30, 30)]);
    }

    #[test]
    fn test_upscale_indices_stay_in_bounds() {
        assert_eq!(nearest_indices(2, 5), vec![0, 0, 0, 1, 1]);
        assert_eq!(nearest_indices(3, 1), vec![0]);
    }

    #[test]
    fn test_zero_area_target_is_empty() {
        let frame = FrameBuffer::from_u8(2, 2, ColorMode::Mono, vec![1, 2, 3, 4]).unwrap();
        let mut renderer = FrameRenderer::new();
        assert!(renderer.render(&frame, &window(0, 255), 0, 10).is_empty());
    }

    #[test]
    fn test_buffer_reused_for_same_size() {
        let frame = FrameBuffer::from_u8(4, 4, ColorMode::Mono, vec![9; 16]).unwrap();
        let mut renderer = FrameRenderer::new();
        renderer.render(&frame, &window(0, 255), 4, 4);
        renderer.render(&frame, &window(0, 255), 4, 4);
        assert_eq!(renderer.allocations(), 1);
        renderer.render(&frame, &window(0, 255), 2, 2);
        assert_eq!(renderer.allocations(), 2);
    }
}
