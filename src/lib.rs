//! Headless human-pose pipeline: heuristic pose classification on live
//! frames and privacy-preserving renderings of periodic stills.
//!
//! Keypoints come from an external detector behind
//! [`pipeline::PoseDetector`]; everything downstream of that seam lives here.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod pose;
pub mod remote;
pub mod types;

pub use config::{Configuration, PipelineSettings, SettingsHandle};
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, RegionMaskCompositor, TemporalOverlayBuffer};
pub use pose::{PoseClassifier, classify};
pub use types::{
    ClassificationResult, Detection, FaceRectangle, Frame, Joint, Keypoint, PoseKeypointMap,
    PoseLabel,
};
