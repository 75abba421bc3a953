//! Histogram binning and the throttled engine

use livescope::contrast::ContrastModel;
use livescope::histogram::{Histogram, HistogramEngine, DEFAULT_HISTOGRAM_INTERVAL};
use livescope::invariants::{assert_contract, clear_ledger, HISTOGRAM_COUNTS_EVERY_PIXEL};
use livescope::types::{ColorMode, FrameBuffer};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn mono8(width: u32, height: u32, value: u8) -> FrameBuffer {
    FrameBuffer::from_u8(width, height, ColorMode::Mono, vec![value; (width * height) as usize])
        .unwrap()
}

#[test]
fn test_mono_16_bit_extremes_hit_end_bins() {
    let frame = FrameBuffer::from_u16(2, 1, ColorMode::Mono, &[0, 65535]).unwrap();
    let histogram = Histogram::from_frame(&frame);
    assert_eq!(histogram.bin(0), 1);
    assert_eq!(histogram.bin(255), 1);
    assert_eq!(histogram.total(), 2);
}

#[test]
fn test_rgb_bins_by_luminance() {
    // White and black pixels land in the end bins; pure green at ~58.7% luma.
    let frame = FrameBuffer::from_u8(
        3,
        1,
        ColorMode::Rgb,
        vec![255, 255, 255, 0, 0, 0, 0, 255, 0],
    )
    .unwrap();
    let histogram = Histogram::from_frame(&frame);
    assert_eq!(histogram.bin(255), 1);
    assert_eq!(histogram.bin(0), 1);
    assert_eq!(histogram.bin(149), 1);
}

#[test]
fn test_engine_throttles_within_interval() {
    let contrast = Arc::new(ContrastModel::new());
    let mut engine = HistogramEngine::new(contrast, DEFAULT_HISTOGRAM_INTERVAL);
    let frame = mono8(4, 4, 10);
    let t0 = Instant::now();

    assert!(engine.update_at(&frame, t0).is_some());
    assert!(engine
        .update_at(&frame, t0 + Duration::from_millis(100))
        .is_none());
    assert!(engine
        .update_at(&frame, t0 + DEFAULT_HISTOGRAM_INTERVAL)
        .is_some());
}

#[test]
fn test_engine_throttled_call_keeps_previous_histogram() {
    let contrast = Arc::new(ContrastModel::new());
    let mut engine = HistogramEngine::new(contrast, Duration::from_secs(60));
    let t0 = Instant::now();

    engine.update_at(&mono8(2, 2, 0), t0);
    engine.update_at(&mono8(2, 2, 255), t0 + Duration::from_millis(1));
    assert_eq!(engine.latest().unwrap().bin(0), 4);
}

#[test]
fn test_engine_drives_auto_scale() {
    let contrast = Arc::new(ContrastModel::new());
    contrast.set_auto_scale(true);
    let mut engine = HistogramEngine::new(contrast.clone(), Duration::ZERO);

    let samples: Vec<u8> = (0..100).map(|i| if i < 50 { 40 } else { 120 }).collect();
    let frame = FrameBuffer::from_u8(10, 10, ColorMode::Mono, samples).unwrap();
    engine.update(&frame);

    let window = contrast.snapshot();
    assert_eq!((window.min, window.max), (40, 120));
}

#[test]
fn test_engine_leaves_manual_window_alone() {
    let contrast = Arc::new(ContrastModel::new());
    contrast.set_explicit(5, 50);
    let mut engine = HistogramEngine::new(contrast.clone(), Duration::ZERO);

    engine.update(&mono8(3, 3, 200));
    let window = contrast.snapshot();
    assert_eq!((window.min, window.max), (5, 50));
}

#[test]
fn contract_histogram_counts_every_pixel() {
    clear_ledger();
    Histogram::from_frame(&mono8(8, 8, 77));
    assert_contract("histogram", &[HISTOGRAM_COUNTS_EVERY_PIXEL]);
}

fn arb_frame() -> impl Strategy<Value = FrameBuffer> {
    (1u32..24, 1u32..24, any::<bool>(), any::<bool>()).prop_flat_map(
        |(width, height, rgb, sixteen_bit)| {
            let color_mode = if rgb { ColorMode::Rgb } else { ColorMode::Mono };
            let count = (width * height) as usize * color_mode.channel_count();
            prop::collection::vec(any::<u16>(), count).prop_map(move |values| {
                if sixteen_bit {
                    FrameBuffer::from_u16(width, height, color_mode, &values).unwrap()
                } else {
                    let bytes = values.iter().map(|&v| v as u8).collect();
                    FrameBuffer::from_u8(width, height, color_mode, bytes).unwrap()
                }
            })
        },
    )
}

proptest! {
    #[test]
    fn prop_histogram_total_equals_pixel_count(frame in arb_frame()) {
        let histogram = Histogram::from_frame(&frame);
        let sum: u64 = histogram.bins().iter().sum();
        prop_assert_eq!(sum, (frame.width() * frame.height()) as u64);
        prop_assert_eq!(histogram.total(), sum);
    }
}
