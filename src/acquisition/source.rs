use crate::errors::PipelineError;
use crate::types::FrameBuffer;
use std::fmt;

/// Upstream frame provider.
///
/// Every call may block for the length of a network transfer. The scheduler
/// only calls these from blocking worker threads, never from the presentation
/// thread.
pub trait FrameSource: Send + Sync {
    /// Latest frame, or `Ok(None)` while the camera is still warming up.
    fn fetch_frame(&self) -> Result<Option<FrameBuffer>, PipelineError>;

    /// `count` consecutive frames. Fails as a whole if any fetch fails.
    ///
    /// The default implementation issues `count` sequential `fetch_frame`
    /// calls; a missing frame in the middle of a burst counts as a failure.
    fn fetch_frame_burst(&self, count: usize) -> Result<Vec<FrameBuffer>, BurstError> {
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            match self.fetch_frame() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {
                    return Err(BurstError {
                        completed: frames.len(),
                        error: PipelineError::transport("no frame available during burst"),
                    })
                }
                Err(error) => {
                    return Err(BurstError {
                        completed: frames.len(),
                        error,
                    })
                }
            }
        }
        Ok(frames)
    }

    /// Whether the camera is in continuous acquisition.
    fn is_streaming_active(&self) -> bool;

    /// Switch continuous acquisition on or off. Independent of polling.
    fn set_streaming(&self, active: bool) -> Result<(), PipelineError>;
}

/// A burst that stopped partway.
#[derive(Debug, Clone, PartialEq)]
pub struct BurstError {
    /// Frames fetched successfully before the failure
    pub completed: usize,
    pub error: PipelineError,
}

impl fmt::Display for BurstError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "burst failed after {} frames: {}", self.completed, self.error)
    }
}

impl std::error::Error for BurstError {}
