//! Rate limiting and frame-rate measurement
//!
//! Both types take the current instant as an argument so callers (and tests)
//! control the clock.

use std::time::{Duration, Instant};

/// Drops requests that arrive sooner than `min_interval` after the last
/// accepted one.
///
/// Owned by a single task category, so it is plain mutable state.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last_accepted: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: None,
        }
    }

    /// Returns true and records `now` if a request is allowed at `now`.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.last_accepted {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                self.last_accepted = Some(now);
                true
            }
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Forget the last accepted request so the next one always passes.
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

/// Frames-per-second over a sliding window.
///
/// The rate is recomputed once the window has been open for at least
/// `window`; count and window start reset at that point.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window: Duration,
    window_start: Option<Instant>,
    frames: u32,
    fps: f64,
}

impl FpsCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: None,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Count one frame and return the current rate.
    pub fn record(&mut self, now: Instant) -> f64 {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed >= self.window {
            self.fps = self.frames as f64 / elapsed.as_secs_f64();
            self.frames = 0;
            self.window_start = Some(now);
        }
        self.fps
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn reset(&mut self) {
        self.window_start = None;
        self.frames = 0;
        self.fps = 0.0;
    }
}
