//! Error types shared by the pipeline stages.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures that can surface from the pipeline.
///
/// A frame without a detection is not an error; detectors report that as
/// `None`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No capture source could be opened. Fatal to pipeline start.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    /// An image stage produced no output for this cycle.
    #[error("compositing failed: {0}")]
    CompositingFailure(String),
    /// The remote classifier could not be reached.
    #[error("remote classification transport failed: {0}")]
    Transport(String),
    /// The remote classifier answered with something we cannot decode.
    #[error("remote classification response invalid: {0}")]
    InvalidResponse(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
