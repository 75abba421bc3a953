//! Presentation thread
//!
//! The only thread that renders. It owns the [`FrameRenderer`] and paints the
//! newest queued frame with whatever contrast window is current at that
//! moment, which may predate the histogram update for the same frame.

use super::scheduler::Shared;
use super::stats::StatsCounters;
use crate::errors::PipelineError;
use crate::render::FrameRenderer;
use crate::types::{FrameBuffer, FrameFormat};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

/// One frame waiting to be painted.
pub(crate) struct PaintJob {
    pub frame: FrameBuffer,
    pub generation: u64,
    pub fps: f64,
}

/// Bounded queue that discards the oldest entry when full.
pub(crate) struct PaintQueue<T> {
    inner: Mutex<QueueInner<T>>,
    cv: Condvar,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

impl<T> PaintQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.min(16)),
                capacity: capacity.max(1),
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `item`. Returns true if an older item was dropped to make room.
    /// Never blocks beyond the queue mutex.
    pub fn push_drop_oldest(&self, item: T) -> bool {
        let mut g = self.lock();
        if g.closed {
            return false;
        }

        let mut dropped = false;
        if g.items.len() >= g.capacity {
            g.items.pop_front();
            dropped = true;
        }
        g.items.push_back(item);
        self.cv.notify_one();
        dropped
    }

    /// Wait for the next item. `None` once the queue is closed.
    pub fn pop(&self) -> Option<T> {
        let mut g = self.lock();
        loop {
            if g.closed {
                return None;
            }
            if let Some(item) = g.items.pop_front() {
                return Some(item);
            }
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wake the consumer and discard anything still queued.
    pub fn close(&self) {
        let mut g = self.lock();
        g.closed = true;
        g.items.clear();
        self.cv.notify_all();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }
}

/// Start the presentation thread for one polling session.
///
/// The thread exits on its own once `queue` is closed; nobody joins it.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    queue: Arc<PaintQueue<PaintJob>>,
) -> Result<JoinHandle<()>, PipelineError> {
    std::thread::Builder::new()
        .name("livescope-present".to_string())
        .spawn(move || present_loop(shared, queue))
        .map_err(|e| PipelineError::Runtime(format!("presentation thread spawn failed: {e}")))
}

fn present_loop(shared: Arc<Shared>, queue: Arc<PaintQueue<PaintJob>>) {
    let mut renderer = FrameRenderer::new();
    log::debug!("Presentation thread started");

    while let Some(job) = queue.pop() {
        if !shared.is_current(job.generation) {
            StatsCounters::bump(&shared.stats.late_results_discarded);
            continue;
        }

        let format = job.frame.format_key();
        shared.observe_format(&format);

        let window = shared.contrast.snapshot();
        let (width, height) = shared.target_size(&job.frame);
        let pixels = renderer.render(&job.frame, &window, width, height);
        let status = format_status(job.fps, &format, shared.streaming_cached());

        if !shared.is_current(job.generation) {
            StatsCounters::bump(&shared.stats.late_results_discarded);
            continue;
        }
        StatsCounters::bump(&shared.stats.frames_rendered);
        shared.listener.on_frame_ready(pixels, &status);
    }

    log::debug!("Presentation thread exiting");
}

/// Status line shown under the live image.
pub fn format_status(fps: f64, format: &FrameFormat, streaming: bool) -> String {
    format!(
        "{:.1} fps | {}x{} | {} | {}-bit | streaming {}",
        fps,
        format.width,
        format.height,
        format.color_mode.as_str(),
        format.bytes_per_sample as u32 * 8,
        if streaming { "on" } else { "off" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColorMode;

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let queue = PaintQueue::new(1);
        assert!(!queue.push_drop_oldest(1));
        assert!(queue.push_drop_oldest(2));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn test_closed_queue_rejects_and_wakes() {
        let queue = Arc::new(PaintQueue::<u32>::new(2));
        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.pop())
        };
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
        assert!(!queue.push_drop_oldest(5));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_status_line() {
        let format = FrameFormat {
            width: 2048,
            height: 1536,
            color_mode: ColorMode::Rgb,
            bytes_per_sample: 2,
        };
        assert_eq!(
            format_status(9.84, &format, true),
            "9.8 fps | 2048x1536 | RGB | 16-bit | streaming on"
        );
    }
}
