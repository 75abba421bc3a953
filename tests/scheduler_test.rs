//! Acquisition scheduler end to end against scripted and synthetic cameras

use livescope::testing::{ScriptStep, ScriptedSource, SyntheticFrameSpec, SyntheticSource};
use livescope::types::{ColorMode, FrameBuffer};
use livescope::{
    AcquisitionScheduler, ChannelListener, PipelineConfig, PipelineError, PipelineEvent,
    PipelineStatus, SchedulerState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.timing.fetch_period_ms = 10;
    config.timing.histogram_interval_ms = 10;
    config.timing.spatial_noise_interval_ms = 10;
    config
}

fn mono_frame(value: u8) -> FrameBuffer {
    FrameBuffer::from_u8(4, 4, ColorMode::Mono, vec![value; 16]).unwrap()
}

fn scheduler_with(
    source: Arc<ScriptedSource>,
    config: PipelineConfig,
) -> (AcquisitionScheduler, UnboundedReceiver<PipelineEvent>) {
    let (listener, events) = ChannelListener::new();
    let scheduler = AcquisitionScheduler::new(source, Arc::new(listener), config).unwrap();
    (scheduler, events)
}

/// Wait for the first event matching `pred`, failing after two seconds.
async fn wait_for<F>(events: &mut UnboundedReceiver<PipelineEvent>, mut pred: F) -> PipelineEvent
where
    F: FnMut(&PipelineEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("listener channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for pipeline event")
}

fn is_result(event: &PipelineEvent) -> bool {
    matches!(
        event,
        PipelineEvent::FrameReady { .. }
            | PipelineEvent::HistogramReady { .. }
            | PipelineEvent::NoiseReady(_)
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_before_first_tick_produces_nothing() {
    let source = Arc::new(ScriptedSource::from_frames((0..10).map(mono_frame)));
    let mut config = fast_config();
    config.timing.fetch_period_ms = 50;
    let (scheduler, mut events) = scheduler_with(source.clone(), config);

    scheduler.start().unwrap();
    scheduler.stop();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(source.fetch_calls(), 0);
    while let Ok(event) = events.try_recv() {
        assert!(!is_result(&event), "unexpected event {:?}", event);
    }
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_frames_rendered_with_status_line() {
    let source = Arc::new(ScriptedSource::from_frames((0..5).map(|_| mono_frame(255))));
    let (scheduler, mut events) = scheduler_with(source, fast_config());
    scheduler.start().unwrap();

    let event = wait_for(&mut events, |e| matches!(e, PipelineEvent::FrameReady { .. })).await;
    let PipelineEvent::FrameReady { pixels, status } = event else {
        unreachable!()
    };
    assert_eq!((pixels.width, pixels.height), (4, 4));
    assert!(pixels.pixels.iter().all(|&p| p == 0xFFFF_FFFF));
    assert!(status.contains("4x4 | Mono | 8-bit"), "status {}", status);

    scheduler.stop();
    let stats = scheduler.stats();
    assert!(stats.frames_fetched >= 1);
    assert!(stats.frames_rendered >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_display_size_rescales_output() {
    let source = Arc::new(ScriptedSource::from_frames((0..5).map(|_| mono_frame(0))));
    let (scheduler, mut events) = scheduler_with(source, fast_config());
    scheduler.set_display_size(Some((8, 2)));
    scheduler.start().unwrap();

    let event = wait_for(&mut events, |e| matches!(e, PipelineEvent::FrameReady { .. })).await;
    if let PipelineEvent::FrameReady { pixels, .. } = event {
        assert_eq!((pixels.width, pixels.height), (8, 2));
    }
    scheduler.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transport_error_reported_and_polling_continues() {
    let mut steps = vec![
        ScriptStep::Gap,
        ScriptStep::TransportError("connection refused".into()),
    ];
    steps.extend((0..100).map(|_| ScriptStep::Frame(mono_frame(10))));
    let source = Arc::new(ScriptedSource::new(steps));
    let (scheduler, mut events) = scheduler_with(source, fast_config());
    scheduler.start().unwrap();

    let error = wait_for(&mut events, |e| {
        matches!(e, PipelineEvent::Status(PipelineStatus::ConnectionError(_)))
    })
    .await;
    if let PipelineEvent::Status(PipelineStatus::ConnectionError(message)) = error {
        assert!(message.contains("connection refused"));
    }

    wait_for(&mut events, |e| matches!(e, PipelineEvent::FrameReady { .. })).await;
    assert_eq!(scheduler.status(), PipelineStatus::Live);

    scheduler.stop();
    let stats = scheduler.stats();
    assert_eq!(stats.transport_errors, 1);
    assert_eq!(stats.empty_ticks, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_in_flight_fetch_discarded_after_stop() {
    let source = Arc::new(
        ScriptedSource::from_frames((0..5).map(mono_frame))
            .with_fetch_delay(Duration::from_millis(100)),
    );
    let (scheduler, mut events) = scheduler_with(source.clone(), fast_config());
    scheduler.start().unwrap();

    while source.fetch_calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    scheduler.stop();
    tokio::time::sleep(Duration::from_millis(300)).await;

    while let Ok(event) = events.try_recv() {
        assert!(!is_result(&event), "result after stop: {:?}", event);
    }
    assert_eq!(scheduler.stats().frames_rendered, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_auto_scale_on_start_reports_window() {
    let samples: Vec<u8> = (0..16).map(|i| if i < 8 { 40 } else { 120 }).collect();
    let frame = FrameBuffer::from_u8(4, 4, ColorMode::Mono, samples).unwrap();
    let source = Arc::new(ScriptedSource::from_frames(vec![frame; 50]));
    let mut config = fast_config();
    config.contrast.auto_scale_on_start = true;
    let (scheduler, mut events) = scheduler_with(source, config);
    scheduler.start().unwrap();

    // The first painted frame sizes the window to full range once.
    let event = wait_for(&mut events, |e| {
        matches!(e, PipelineEvent::HistogramReady { window, .. } if window.auto_scale)
    })
    .await;
    if let PipelineEvent::HistogramReady { histogram, window } = event {
        assert_eq!(histogram.total(), 16);
        assert!(window.auto_scale);
        assert_eq!((window.min, window.max), (40, 120));
    }
    scheduler.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_auto_scale_enabled_before_start_survives_first_frame() {
    let samples: Vec<u8> = (0..16).map(|i| if i < 8 { 40 } else { 120 }).collect();
    let frame = FrameBuffer::from_u8(4, 4, ColorMode::Mono, samples).unwrap();
    let source = Arc::new(ScriptedSource::from_frames(vec![frame; 100]));
    let (scheduler, mut events) = scheduler_with(source, fast_config());
    assert!(!scheduler.config().contrast.auto_scale_on_start);

    scheduler.enable_auto_scale(true);
    scheduler.start().unwrap();
    wait_for(&mut events, |e| matches!(e, PipelineEvent::FrameReady { .. })).await;
    wait_for(&mut events, |e| {
        matches!(e, PipelineEvent::HistogramReady { window, .. } if window.auto_scale)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let window = scheduler.contrast().snapshot();
    assert!(window.auto_scale);
    assert_eq!((window.min, window.max), (40, 120));
    scheduler.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_keeps_explicit_window() {
    let source = Arc::new(ScriptedSource::from_frames((0..200).map(|_| mono_frame(60))));
    let (scheduler, mut events) = scheduler_with(source, fast_config());

    scheduler.start().unwrap();
    wait_for(&mut events, |e| matches!(e, PipelineEvent::FrameReady { .. })).await;
    scheduler.set_contrast_explicit(20, 80);
    scheduler.stop();

    let rendered_before_restart = scheduler.stats().frames_rendered;
    scheduler.start().unwrap();
    while scheduler.stats().frames_rendered < rendered_before_restart + 2 {
        wait_for(&mut events, |e| matches!(e, PipelineEvent::FrameReady { .. })).await;
    }
    let window = scheduler.contrast().snapshot();
    assert_eq!((window.min, window.max), (20, 80));
    scheduler.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_format_change_resets_to_full_range() {
    let rgb16 = FrameBuffer::from_u16(4, 4, ColorMode::Rgb, &[1000u16; 48]).unwrap();
    let mut steps: Vec<ScriptStep> = (0..20).map(|_| ScriptStep::Frame(mono_frame(60))).collect();
    steps.extend((0..50).map(|_| ScriptStep::Frame(rgb16.clone())));
    let (scheduler, mut events) = scheduler_with(Arc::new(ScriptedSource::new(steps)), fast_config());

    scheduler.start().unwrap();
    wait_for(&mut events, |e| {
        matches!(e, PipelineEvent::FrameReady { status, .. } if status.contains("8-bit"))
    })
    .await;
    scheduler.set_contrast_explicit(20, 80);
    assert_eq!(scheduler.contrast().snapshot().max, 80);

    wait_for(&mut events, |e| {
        matches!(e, PipelineEvent::FrameReady { status, .. } if status.contains("16-bit"))
    })
    .await;
    let window = scheduler.contrast().snapshot();
    assert_eq!((window.min, window.max), (0, 65535));
    assert!(!window.auto_scale);
    scheduler.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_histogram_finishing_after_stop_is_discarded() {
    // Large enough that binning outlasts painting a tiny display.
    let (width, height) = (4000, 3000);
    let samples = vec![0x80u8; width as usize * height as usize * 3 * 2];
    let frame = FrameBuffer::new(width, height, ColorMode::Rgb, 2, samples).unwrap();
    let source = Arc::new(ScriptedSource::from_frames(vec![frame]));
    let (scheduler, mut events) = scheduler_with(source, fast_config());
    scheduler.set_display_size(Some((8, 8)));

    scheduler.start().unwrap();
    wait_for(&mut events, |e| matches!(e, PipelineEvent::FrameReady { .. })).await;
    scheduler.stop();

    tokio::time::timeout(Duration::from_secs(10), async {
        while scheduler.stats().late_results_discarded == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("histogram job never finished");

    assert_eq!(scheduler.stats().histograms_computed, 0);
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, PipelineEvent::HistogramReady { .. }),
            "histogram delivered after stop"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zero_display_size_renders_empty_buffer() {
    let source = Arc::new(ScriptedSource::from_frames((0..5).map(|_| mono_frame(0))));
    let (scheduler, mut events) = scheduler_with(source, fast_config());
    scheduler.set_display_size(Some((0, 0)));
    scheduler.start().unwrap();

    let event = wait_for(&mut events, |e| matches!(e, PipelineEvent::FrameReady { .. })).await;
    if let PipelineEvent::FrameReady { pixels, .. } = event {
        assert!(pixels.is_empty());
    }
    scheduler.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_spatial_noise_only_with_panel_expanded() {
    let spec = SyntheticFrameSpec {
        width: 16,
        height: 16,
        color_mode: ColorMode::Rgb,
        ..Default::default()
    };
    let (listener, mut events) = ChannelListener::new();
    let scheduler = AcquisitionScheduler::new(
        Arc::new(SyntheticSource::new(spec)),
        Arc::new(listener),
        fast_config(),
    )
    .unwrap();

    scheduler.start().unwrap();
    wait_for(&mut events, |e| matches!(e, PipelineEvent::FrameReady { .. })).await;
    assert_eq!(scheduler.stats().noise_estimates, 0);

    scheduler.set_noise_panel_expanded(true);
    let event = wait_for(&mut events, |e| matches!(e, PipelineEvent::NoiseReady(_))).await;
    if let PipelineEvent::NoiseReady(sample) = event {
        assert!(!sample.is_temporal());
        assert_eq!(sample.channels.len(), 3);
    }
    scheduler.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_transitions() {
    let source = Arc::new(ScriptedSource::from_frames(vec![mono_frame(1)]));
    let mut config = fast_config();
    config.timing.fetch_period_ms = 50;
    let (scheduler, mut events) = scheduler_with(source, config);
    assert_eq!(scheduler.status(), PipelineStatus::Idle);

    scheduler.start().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Polling);
    assert_eq!(scheduler.status(), PipelineStatus::WaitingForFrames);

    wait_for(&mut events, |e| matches!(e, PipelineEvent::Status(PipelineStatus::Live))).await;
    // Script is exhausted after one frame, so the camera goes quiet again.
    wait_for(&mut events, |e| {
        matches!(e, PipelineEvent::Status(PipelineStatus::WaitingForFrames))
    })
    .await;

    scheduler.stop();
    scheduler.stop();
    assert_eq!(scheduler.status(), PipelineStatus::Idle);
}

#[tokio::test]
async fn test_explicit_contrast_clamped_and_ordered() {
    let source = Arc::new(ScriptedSource::new(Vec::new()));
    let (scheduler, _events) = scheduler_with(source, fast_config());
    scheduler.enable_auto_scale(true);

    // No frame seen yet: the 8-bit range applies.
    scheduler.set_contrast_explicit(300, 10);
    let window = scheduler.contrast().snapshot();
    assert_eq!((window.min, window.max), (10, 255));
    assert!(!window.auto_scale);

    scheduler.apply_full_range();
    let window = scheduler.contrast().snapshot();
    assert_eq!((window.min, window.max), (0, 255));
}

#[tokio::test]
async fn test_temporal_noise_request_limits_and_failure() {
    let mut steps: Vec<ScriptStep> = (0..5).map(|_| ScriptStep::Frame(mono_frame(9))).collect();
    steps.push(ScriptStep::TransportError("timeout".into()));
    let source = Arc::new(ScriptedSource::new(steps));
    let (scheduler, mut events) = scheduler_with(source.clone(), fast_config());

    let too_many = scheduler.request_temporal_noise(10_000).await;
    assert!(matches!(too_many, Err(PipelineError::InvalidArgument(_))));
    assert_eq!(source.fetch_calls(), 0);

    let failed = scheduler.request_temporal_noise(10).await;
    assert!(matches!(
        failed,
        Err(PipelineError::TemporalNoiseFailure {
            completed: 5,
            requested: 10,
            ..
        })
    ));
    // No partial statistic reaches the listener.
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_temporal_noise_request_delivers_sample() {
    let source = Arc::new(ScriptedSource::from_frames((0..3).map(|_| mono_frame(50))));
    let (scheduler, mut events) = scheduler_with(source, fast_config());

    let sample = scheduler.request_temporal_noise(3).await.unwrap();
    assert!(sample.is_temporal());
    assert!(matches!(events.try_recv(), Ok(PipelineEvent::NoiseReady(_))));
}

#[test]
fn test_streaming_passthrough() {
    let source = Arc::new(ScriptedSource::new(Vec::new()));
    let (scheduler, _events) = scheduler_with(source.clone(), fast_config());

    tokio_test::assert_ok!(tokio_test::block_on(scheduler.set_streaming(true)));
    assert!(scheduler.is_streaming());
    assert!(livescope::FrameSource::is_streaming_active(source.as_ref()));
}

#[test]
fn test_start_without_runtime_fails() {
    let source = Arc::new(ScriptedSource::new(Vec::new()));
    let (scheduler, _events) = scheduler_with(source, fast_config());
    assert!(matches!(scheduler.start(), Err(PipelineError::Runtime(_))));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = PipelineConfig::default();
    config.timing.fetch_period_ms = 0;
    let source = Arc::new(ScriptedSource::new(Vec::new()));
    let (listener, _events) = ChannelListener::new();
    assert!(matches!(
        AcquisitionScheduler::new(source, Arc::new(listener), config),
        Err(PipelineError::Config(_))
    ));
}
