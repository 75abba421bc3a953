//! Live acquisition: polling the camera and fanning frames out to the
//! histogram, noise and presentation consumers.

pub mod listener;
mod presenter;
pub mod scheduler;
pub mod source;
mod stats;

pub use listener::{ChannelListener, NullListener, PipelineEvent, PipelineListener, PipelineStatus};
pub use presenter::format_status;
pub use scheduler::{AcquisitionScheduler, SchedulerState};
pub use source::{BurstError, FrameSource};
pub use stats::PipelineStats;
