//! Periodic acquisition and fan-out
//!
//! One tokio task polls the frame source at a fixed period. Each frame is
//! handed to three consumers:
//!
//! 1. the histogram task (blocking pool), which may update the contrast window;
//! 2. the spatial noise task (blocking pool), only while the noise panel is
//!    expanded and only for colour frames;
//! 3. the presentation thread, through a drop-oldest paint queue.
//!
//! Each compute category runs at most one job at a time. A frame that arrives
//! while its category is still busy is skipped for that category rather than
//! queued, so a slow computation can never build a backlog behind a fast feed.
//!
//! Results that complete after [`AcquisitionScheduler::stop`] are discarded:
//! every start opens a new generation and results are only applied if their
//! generation is still the active one.

use super::listener::{PipelineListener, PipelineStatus};
use super::presenter::{self, PaintJob, PaintQueue};
use super::source::FrameSource;
use super::stats::{PipelineStats, StatsCounters};
use crate::config::PipelineConfig;
use crate::contrast::ContrastModel;
use crate::errors::PipelineError;
use crate::histogram::HistogramEngine;
use crate::noise::NoiseEstimator;
use crate::timing::FpsCounter;
use crate::types::{ColorMode, FrameBuffer, FrameFormat, NoiseSample};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Lifecycle of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Polling,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears a category's busy flag when the job ends, even by panic.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn try_claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// State reachable from the fetch task, the compute jobs and the presentation
/// thread.
pub(crate) struct Shared {
    pub source: Arc<dyn FrameSource>,
    pub listener: Arc<dyn PipelineListener>,
    pub contrast: Arc<ContrastModel>,
    pub config: PipelineConfig,
    pub stats: StatsCounters,
    active: AtomicBool,
    generation: AtomicU64,
    histogram: Mutex<HistogramEngine>,
    histogram_busy: AtomicBool,
    noise: Mutex<NoiseEstimator>,
    noise_busy: AtomicBool,
    noise_panel_expanded: AtomicBool,
    streaming: AtomicBool,
    /// `None` renders at the frame's native size.
    display_size: Mutex<Option<(u32, u32)>>,
    /// Format of the last painted frame. Outlives polling sessions so a
    /// restart with the same camera keeps the user's window.
    last_format: Mutex<Option<FrameFormat>>,
    /// Largest sample value of the most recent frame.
    max_sample_value: AtomicU32,
    fps: Mutex<FpsCounter>,
    status: Mutex<PipelineStatus>,
    paint_queue: Mutex<Option<Arc<PaintQueue<PaintJob>>>>,
}

impl Shared {
    /// True while `generation` is the running session.
    pub fn is_current(&self, generation: u64) -> bool {
        self.active.load(Ordering::Acquire) && self.generation.load(Ordering::Acquire) == generation
    }

    pub fn streaming_cached(&self) -> bool {
        self.streaming.load(Ordering::Relaxed)
    }

    pub fn target_size(&self, frame: &FrameBuffer) -> (u32, u32) {
        lock(&self.display_size).unwrap_or((frame.width(), frame.height()))
    }

    /// Called by the presentation thread for every frame it paints.
    ///
    /// The very first frame sizes the window to its sample range and keeps
    /// the auto-scale choice. A later change of geometry or bit depth resets
    /// to full range and leaves auto-scale.
    pub fn observe_format(&self, format: &FrameFormat) {
        let mut last = lock(&self.last_format);
        if *last == Some(*format) {
            return;
        }
        let first_frame = last.is_none();
        *last = Some(*format);
        drop(last);

        log::info!(
            "Display format now {}x{} {} {}-bit",
            format.width,
            format.height,
            format.color_mode.as_str(),
            format.bytes_per_sample as u32 * 8
        );
        if first_frame {
            self.contrast.reset_window(format.max_sample_value());
        } else {
            self.contrast.apply_full_range(format.max_sample_value());
        }
    }

    fn set_status(&self, status: PipelineStatus) {
        let mut current = lock(&self.status);
        if *current != status {
            log::debug!("Pipeline status: {}", status);
            *current = status.clone();
            drop(current);
            self.listener.on_status(&status);
        }
    }

    /// Fan one fetched frame out to the compute jobs and the painter.
    ///
    /// Runs inside the fetch task. The histogram job is submitted before the
    /// paint job, but painting does not wait for it.
    fn dispatch(self: &Arc<Self>, frame: FrameBuffer, generation: u64) {
        StatsCounters::bump(&self.stats.frames_fetched);
        self.set_status(PipelineStatus::Live);
        self.max_sample_value
            .store(frame.max_sample_value(), Ordering::Relaxed);
        let fps = lock(&self.fps).record(Instant::now());

        self.submit_histogram(&frame, generation);
        if self.noise_panel_expanded.load(Ordering::Relaxed) && frame.color_mode() == ColorMode::Rgb {
            self.submit_noise(&frame, generation);
        }

        if let Some(queue) = lock(&self.paint_queue).as_ref() {
            let dropped = queue.push_drop_oldest(PaintJob {
                frame,
                generation,
                fps,
            });
            if dropped {
                StatsCounters::bump(&self.stats.paint_drops);
            }
        }
    }

    fn submit_histogram(self: &Arc<Self>, frame: &FrameBuffer, generation: u64) {
        if self.histogram_busy.load(Ordering::Acquire) {
            StatsCounters::bump(&self.stats.histogram_skips);
            log::trace!("Histogram task busy, skipping frame");
            return;
        }

        let shared = self.clone();
        let frame = frame.clone();
        tokio::task::spawn_blocking(move || {
            let Some(_busy) = BusyGuard::try_claim(&shared.histogram_busy) else {
                StatsCounters::bump(&shared.stats.histogram_skips);
                return;
            };
            let mut engine = lock(&shared.histogram);
            let Some(histogram) = engine.compute_at(&frame, Instant::now()) else {
                StatsCounters::bump(&shared.stats.histogram_skips);
                return;
            };
            if !shared.is_current(generation) {
                StatsCounters::bump(&shared.stats.late_results_discarded);
                return;
            }
            let window = engine.apply_auto_scale(&histogram, frame.max_sample_value());
            StatsCounters::bump(&shared.stats.histograms_computed);
            shared.listener.on_histogram_ready(&histogram, window);
        });
    }

    fn submit_noise(self: &Arc<Self>, frame: &FrameBuffer, generation: u64) {
        if self.noise_busy.load(Ordering::Acquire) {
            StatsCounters::bump(&self.stats.noise_skips);
            return;
        }

        let shared = self.clone();
        let frame = frame.clone();
        tokio::task::spawn_blocking(move || {
            let Some(_busy) = BusyGuard::try_claim(&shared.noise_busy) else {
                StatsCounters::bump(&shared.stats.noise_skips);
                return;
            };
            let Some(sample) = lock(&shared.noise).spatial_estimate(&frame) else {
                StatsCounters::bump(&shared.stats.noise_skips);
                return;
            };
            if !shared.is_current(generation) {
                StatsCounters::bump(&shared.stats.late_results_discarded);
                return;
            }
            StatsCounters::bump(&shared.stats.noise_estimates);
            shared.listener.on_noise_ready(&sample);
        });
    }
}

/// Owner of the live pipeline.
///
/// Construct one per viewing session and hand references to whoever needs
/// them; there is no global instance. Dropping the scheduler stops it.
pub struct AcquisitionScheduler {
    shared: Arc<Shared>,
    fetch_task: Mutex<Option<JoinHandle<()>>>,
}

impl AcquisitionScheduler {
    pub fn new(
        source: Arc<dyn FrameSource>,
        listener: Arc<dyn PipelineListener>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let contrast = Arc::new(ContrastModel::with_percentiles(
            config.contrast.low_percentile,
            config.contrast.high_percentile,
        ));
        contrast.set_auto_scale(config.contrast.auto_scale_on_start);

        let shared = Shared {
            histogram: Mutex::new(HistogramEngine::new(
                contrast.clone(),
                config.timing.histogram_interval(),
            )),
            noise: Mutex::new(NoiseEstimator::new(config.timing.spatial_noise_interval())),
            fps: Mutex::new(FpsCounter::new(config.timing.fps_window())),
            noise_panel_expanded: AtomicBool::new(config.noise.noise_panel_expanded),
            source,
            listener,
            contrast,
            config,
            stats: StatsCounters::default(),
            active: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            histogram_busy: AtomicBool::new(false),
            noise_busy: AtomicBool::new(false),
            streaming: AtomicBool::new(false),
            display_size: Mutex::new(None),
            last_format: Mutex::new(None),
            max_sample_value: AtomicU32::new(255),
            status: Mutex::new(PipelineStatus::Idle),
            paint_queue: Mutex::new(None),
        };

        Ok(Self {
            shared: Arc::new(shared),
            fetch_task: Mutex::new(None),
        })
    }

    /// Begin polling. Must be called from within a tokio runtime.
    ///
    /// The first fetch happens one period after this returns. Calling `start`
    /// while already polling does nothing.
    pub fn start(&self) -> Result<(), PipelineError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PipelineError::Runtime(format!("no tokio runtime: {e}")))?;

        let mut task = lock(&self.fetch_task);
        if self.shared.active.load(Ordering::Acquire) {
            log::debug!("Scheduler already polling");
            return Ok(());
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        lock(&self.shared.histogram).reset();
        lock(&self.shared.fps).reset();

        let queue = Arc::new(PaintQueue::new(self.shared.config.presentation.queue_capacity));
        presenter::spawn(self.shared.clone(), queue.clone())?;
        *lock(&self.shared.paint_queue) = Some(queue);

        self.shared.active.store(true, Ordering::Release);
        *task = Some(runtime.spawn(fetch_loop(self.shared.clone(), generation)));
        drop(task);

        log::info!(
            "Acquisition started (generation {}, period {:?})",
            generation,
            self.shared.config.timing.fetch_period()
        );
        self.shared.set_status(PipelineStatus::WaitingForFrames);
        Ok(())
    }

    /// Stop polling. Idempotent and non-blocking.
    ///
    /// In-flight compute jobs are left to finish; their results are dropped.
    pub fn stop(&self) {
        let task = lock(&self.fetch_task).take();
        if !self.shared.active.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(task) = task {
            task.abort();
        }
        if let Some(queue) = lock(&self.shared.paint_queue).take() {
            queue.close();
        }

        log::info!("Acquisition stopped");
        self.shared.set_status(PipelineStatus::Idle);
    }

    pub fn state(&self) -> SchedulerState {
        if self.shared.active.load(Ordering::Acquire) {
            SchedulerState::Polling
        } else {
            SchedulerState::Idle
        }
    }

    pub fn status(&self) -> PipelineStatus {
        lock(&self.shared.status).clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats.snapshot()
    }

    /// Rolling acquisition rate over the configured window.
    pub fn fps(&self) -> f64 {
        lock(&self.shared.fps).fps()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    pub fn contrast(&self) -> Arc<ContrastModel> {
        self.shared.contrast.clone()
    }

    /// Set the display window from user input.
    ///
    /// Bounds are clamped to the sample range of the most recent frame and
    /// swapped if given in reverse order. Leaves auto-scale mode.
    pub fn set_contrast_explicit(&self, min: u32, max: u32) {
        let limit = self.shared.max_sample_value.load(Ordering::Relaxed);
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        let low = low.min(limit.saturating_sub(1));
        let high = high.min(limit);
        self.shared.contrast.set_explicit(low, high);
    }

    /// Reset the window to the full sample range of the most recent frame.
    pub fn apply_full_range(&self) {
        let limit = self.shared.max_sample_value.load(Ordering::Relaxed);
        self.shared.contrast.apply_full_range(limit);
    }

    /// Toggle auto-scale. Takes effect with the next histogram update.
    pub fn enable_auto_scale(&self, enabled: bool) {
        log::info!("Auto-scale {}", if enabled { "enabled" } else { "disabled" });
        self.shared.contrast.set_auto_scale(enabled);
    }

    /// Spatial noise is only computed while the noise panel is expanded.
    pub fn set_noise_panel_expanded(&self, expanded: bool) {
        self.shared
            .noise_panel_expanded
            .store(expanded, Ordering::Relaxed);
    }

    /// Render at `(width, height)` instead of the frame's native size.
    /// `None` restores native size.
    pub fn set_display_size(&self, size: Option<(u32, u32)>) {
        *lock(&self.shared.display_size) = size;
    }

    /// Measure temporal noise over `frame_count` freshly fetched frames.
    ///
    /// Runs on the blocking pool for the length of the burst. Independent of
    /// the polling loop; works while idle too. On success the sample is also
    /// delivered through `on_noise_ready`.
    pub async fn request_temporal_noise(
        &self,
        frame_count: usize,
    ) -> Result<NoiseSample, PipelineError> {
        let limit = self.shared.config.noise.max_temporal_frames;
        if frame_count > limit {
            return Err(PipelineError::invalid_argument(format!(
                "temporal noise limited to {} frames, requested {}",
                limit, frame_count
            )));
        }

        let source = self.shared.source.clone();
        let sample = tokio::task::spawn_blocking(move || {
            NoiseEstimator::temporal_estimate(source.as_ref(), frame_count)
        })
        .await
        .map_err(|e| PipelineError::Runtime(format!("temporal noise task failed: {e}")))??;

        self.shared.listener.on_noise_ready(&sample);
        Ok(sample)
    }

    /// Temporal noise with the configured default frame count.
    pub async fn request_default_temporal_noise(&self) -> Result<NoiseSample, PipelineError> {
        self.request_temporal_noise(self.shared.config.noise.default_temporal_frames)
            .await
    }

    /// Switch camera streaming. Does not affect polling.
    pub async fn set_streaming(&self, active: bool) -> Result<(), PipelineError> {
        let source = self.shared.source.clone();
        tokio::task::spawn_blocking(move || source.set_streaming(active))
            .await
            .map_err(|e| PipelineError::Runtime(format!("streaming task failed: {e}")))??;
        self.shared.streaming.store(active, Ordering::Relaxed);
        log::info!("Camera streaming {}", if active { "on" } else { "off" });
        Ok(())
    }

    /// Last known streaming state (refreshed on start and on `set_streaming`).
    pub fn is_streaming(&self) -> bool {
        self.shared.streaming_cached()
    }
}

impl Drop for AcquisitionScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn fetch_loop(shared: Arc<Shared>, generation: u64) {
    let period = shared.config.timing.fetch_period();

    let source = shared.source.clone();
    if let Ok(streaming) = tokio::task::spawn_blocking(move || source.is_streaming_active()).await {
        shared.streaming.store(streaming, Ordering::Relaxed);
    }

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if !shared.is_current(generation) {
            break;
        }

        let source = shared.source.clone();
        let fetched = match tokio::task::spawn_blocking(move || source.fetch_frame()).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Frame fetch task failed: {}", e);
                continue;
            }
        };

        if !shared.is_current(generation) {
            break;
        }

        match fetched {
            Ok(Some(frame)) => shared.dispatch(frame, generation),
            Ok(None) => {
                StatsCounters::bump(&shared.stats.empty_ticks);
                shared.set_status(PipelineStatus::WaitingForFrames);
            }
            Err(e) => {
                StatsCounters::bump(&shared.stats.transport_errors);
                log::warn!("Frame fetch failed: {}", e);
                shared.set_status(PipelineStatus::ConnectionError(e.to_string()));
            }
        }
    }
}
