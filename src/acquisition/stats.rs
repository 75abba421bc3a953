use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one scheduler, readable at any time.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub frames_fetched: AtomicU64,
    pub empty_ticks: AtomicU64,
    pub transport_errors: AtomicU64,
    pub frames_rendered: AtomicU64,
    pub paint_drops: AtomicU64,
    pub histograms_computed: AtomicU64,
    pub histogram_skips: AtomicU64,
    pub noise_estimates: AtomicU64,
    pub noise_skips: AtomicU64,
    pub late_results_discarded: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            frames_fetched: get(&self.frames_fetched),
            empty_ticks: get(&self.empty_ticks),
            transport_errors: get(&self.transport_errors),
            frames_rendered: get(&self.frames_rendered),
            paint_drops: get(&self.paint_drops),
            histograms_computed: get(&self.histograms_computed),
            histogram_skips: get(&self.histogram_skips),
            noise_estimates: get(&self.noise_estimates),
            noise_skips: get(&self.noise_skips),
            late_results_discarded: get(&self.late_results_discarded),
        }
    }
}

/// Point-in-time copy of the scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames_fetched: u64,
    /// Ticks where the camera had no frame yet
    pub empty_ticks: u64,
    pub transport_errors: u64,
    pub frames_rendered: u64,
    /// Frames replaced in the paint queue before they were painted
    pub paint_drops: u64,
    pub histograms_computed: u64,
    /// Frames not binned because the histogram task was busy or throttled
    pub histogram_skips: u64,
    pub noise_estimates: u64,
    /// Frames not measured because the noise task was busy or throttled
    pub noise_skips: u64,
    /// Results that arrived after `stop()` and were thrown away
    pub late_results_discarded: u64,
}
