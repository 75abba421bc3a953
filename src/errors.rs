use thiserror::Error;

/// Errors surfaced by the live-frame pipeline.
///
/// Continuous-pipeline failures (a lost connection during polling) are
/// converted to status updates by the scheduler and never escape a tick.
/// On-demand operations such as the temporal noise measurement return these
/// to the caller so the failure can be shown explicitly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Acquisition transport error: {0}")]
    AcquisitionTransport(String),

    #[error("Temporal noise measurement failed after {completed} of {requested} frames: {cause}")]
    TemporalNoiseFailure {
        completed: usize,
        requested: usize,
        cause: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::AcquisitionTransport(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// True for errors the polling loop recovers from on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::AcquisitionTransport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_is_transient() {
        assert!(PipelineError::transport("socket closed").is_transient());
        assert!(!PipelineError::Runtime("no reactor".into()).is_transient());
    }

    #[test]
    fn test_temporal_failure_message() {
        let err = PipelineError::TemporalNoiseFailure {
            completed: 5,
            requested: 10,
            cause: "connection reset".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("5 of 10"));
        assert!(text.contains("connection reset"));
    }
}
