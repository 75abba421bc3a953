//! A frame source that replays a fixed script
//!
//! Each `fetch_frame` call consumes the next step. Once the script runs out
//! the source reports "no frame yet" forever, like a camera that stopped
//! producing.

use crate::acquisition::FrameSource;
use crate::errors::PipelineError;
use crate::types::FrameBuffer;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// One scripted fetch outcome.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Frame(FrameBuffer),
    /// Camera has nothing yet
    Gap,
    /// Fetch fails with a transport error carrying this message
    TransportError(String),
}

#[derive(Debug)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<ScriptStep>>,
    fetch_delay: Duration,
    fetch_calls: AtomicUsize,
    streaming: AtomicBool,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fetch_delay: Duration::ZERO,
            fetch_calls: AtomicUsize::new(0),
            streaming: AtomicBool::new(false),
        }
    }

    /// Every frame of `frames`, in order.
    pub fn from_frames(frames: impl IntoIterator<Item = FrameBuffer>) -> Self {
        Self::new(frames.into_iter().map(ScriptStep::Frame))
    }

    /// Sleep this long inside every fetch, like a slow network.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Append steps to the end of the script.
    pub fn push(&self, step: ScriptStep) {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
    }

    /// Number of `fetch_frame` calls made so far.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl FrameSource for ScriptedSource {
    fn fetch_frame(&self) -> Result<Option<FrameBuffer>, PipelineError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            std::thread::sleep(self.fetch_delay);
        }

        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match step {
            Some(ScriptStep::Frame(frame)) => Ok(Some(frame)),
            Some(ScriptStep::Gap) | None => Ok(None),
            Some(ScriptStep::TransportError(message)) => Err(PipelineError::transport(message)),
        }
    }

    fn is_streaming_active(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    fn set_streaming(&self, active: bool) -> Result<(), PipelineError> {
        self.streaming.store(active, Ordering::SeqCst);
        Ok(())
    }
}
