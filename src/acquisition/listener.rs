use crate::contrast::ContrastWindow;
use crate::histogram::Histogram;
use crate::types::{NoiseSample, PixelBuffer};
use serde::Serialize;
use tokio::sync::mpsc;

/// Connection-level state of the live feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum PipelineStatus {
    Idle,
    /// Polling, but the camera has not produced a frame yet
    WaitingForFrames,
    Live,
    /// The last fetch failed; polling continues
    ConnectionError(String),
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Idle => write!(f, "idle"),
            PipelineStatus::WaitingForFrames => write!(f, "waiting for frames"),
            PipelineStatus::Live => write!(f, "live"),
            PipelineStatus::ConnectionError(msg) => write!(f, "connection error: {}", msg),
        }
    }
}

/// Callbacks into the presentation layer.
///
/// `on_frame_ready` runs on the presentation thread. The other callbacks run
/// on whichever worker produced the result and must not block.
pub trait PipelineListener: Send + Sync {
    /// A rendered frame plus a one-line status (FPS, size, colour, bit depth).
    fn on_frame_ready(&self, _pixels: &PixelBuffer, _status: &str) {}

    /// A fresh histogram and the window in force after any auto-scale.
    fn on_histogram_ready(&self, _histogram: &Histogram, _window: ContrastWindow) {}

    fn on_noise_ready(&self, _sample: &NoiseSample) {}

    /// Only called when the status changes.
    fn on_status(&self, _status: &PipelineStatus) {}
}

/// Everything a listener can be told, as a value.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    FrameReady { pixels: PixelBuffer, status: String },
    HistogramReady {
        histogram: Histogram,
        window: ContrastWindow,
    },
    NoiseReady(NoiseSample),
    Status(PipelineStatus),
}

/// Listener that forwards every callback into a channel.
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: PipelineEvent) {
        // Receiver gone means nobody is watching any more.
        let _ = self.sender.send(event);
    }
}

impl PipelineListener for ChannelListener {
    fn on_frame_ready(&self, pixels: &PixelBuffer, status: &str) {
        self.send(PipelineEvent::FrameReady {
            pixels: pixels.clone(),
            status: status.to_string(),
        });
    }

    fn on_histogram_ready(&self, histogram: &Histogram, window: ContrastWindow) {
        self.send(PipelineEvent::HistogramReady {
            histogram: histogram.clone(),
            window,
        });
    }

    fn on_noise_ready(&self, sample: &NoiseSample) {
        self.send(PipelineEvent::NoiseReady(sample.clone()));
    }

    fn on_status(&self, status: &PipelineStatus) {
        self.send(PipelineEvent::Status(status.clone()));
    }
}

/// Listener that ignores everything.
pub struct NullListener;

impl PipelineListener for NullListener {}
