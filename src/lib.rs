//! LiveScope: live frame pipeline for networked microscope cameras
//!
//! Frames are polled from a camera at a fixed period and fanned out to three
//! consumers running in parallel:
//! - a throttled 256-bin intensity histogram that can drive auto-scaling of
//!   the display contrast window;
//! - a throttled spatial noise estimate for colour frames, plus an on-demand
//!   temporal noise measurement over a burst of frames;
//! - a presentation thread that maps raw 8/16-bit samples through the
//!   contrast window into a display-sized ARGB buffer.
//!
//! The camera itself is abstracted behind [`FrameSource`]; results are
//! delivered through a [`PipelineListener`].
//!
//! # Usage
//! ```rust,ignore
//! use livescope::{AcquisitionScheduler, ChannelListener, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), livescope::PipelineError> {
//!     livescope::init_logging();
//!     let (listener, mut events) = ChannelListener::new();
//!     let scheduler = AcquisitionScheduler::new(
//!         Arc::new(my_camera()),
//!         Arc::new(listener),
//!         PipelineConfig::default(),
//!     )?;
//!     scheduler.start()?;
//!     while let Some(event) = events.recv().await {
//!         // paint, plot, ...
//!     }
//!     Ok(())
//! }
//! ```
pub mod acquisition;
pub mod config;
pub mod contrast;
pub mod errors;
pub mod histogram;
pub mod invariants;
pub mod noise;
pub mod render;
pub mod timing;
pub mod types;

// Synthetic frames and scripted sources for offline testing
pub mod testing;

// Re-exports for convenience
pub use acquisition::{
    AcquisitionScheduler, ChannelListener, FrameSource, NullListener, PipelineEvent,
    PipelineListener, PipelineStats, PipelineStatus, SchedulerState,
};
pub use config::PipelineConfig;
pub use contrast::{ContrastModel, ContrastWindow};
pub use errors::PipelineError;
pub use histogram::{Histogram, HistogramEngine};
pub use noise::NoiseEstimator;
pub use render::FrameRenderer;
pub use types::{ChannelNoise, ColorMode, FrameBuffer, NoiseKind, NoiseSample, PixelBuffer};

/// Initialize logging for the pipeline
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "livescope=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_name() {
        assert_eq!(NAME, "livescope");
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
    }
}
