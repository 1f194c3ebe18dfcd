use std::path::Path;

use crate::{
    error::{PipelineError, Result},
    types::{Detection, Frame},
};

/// Seam for the external body-pose and face detector.
///
/// `None` is a detection miss: no pose for this frame, not an error.
pub trait PoseDetector: Send + 'static {
    fn detect(&mut self, frame: &Frame) -> Option<Detection>;
}

impl<F> PoseDetector for F
where
    F: FnMut(&Frame) -> Option<Detection> + Send + 'static,
{
    fn detect(&mut self, frame: &Frame) -> Option<Detection> {
        self(frame)
    }
}

/// Replays detections captured earlier, cycling once the list runs out.
/// Lets the pipeline run headless without an inference backend.
#[derive(Clone, Debug, Default)]
pub struct RecordedDetector {
    detections: Vec<Option<Detection>>,
    cursor: usize,
}

impl RecordedDetector {
    pub fn new(detections: Vec<Option<Detection>>) -> Self {
        Self {
            detections,
            cursor: 0,
        }
    }

    /// Accepts either a single detection object or an array where `null`
    /// entries stand for misses.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|err| PipelineError::Config(format!("detection json: {err}")))?;
        let detections = match value {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(serde_json::from_value::<Option<Detection>>)
                .collect::<std::result::Result<Vec<_>, _>>(),
            other => serde_json::from_value::<Detection>(other).map(|d| vec![Some(d)]),
        }
        .map_err(|err| PipelineError::Config(format!("detection json: {err}")))?;
        Ok(Self::new(detections))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

impl PoseDetector for RecordedDetector {
    fn detect(&mut self, _frame: &Frame) -> Option<Detection> {
        if self.detections.is_empty() {
            return None;
        }
        let detection = self.detections[self.cursor % self.detections.len()].clone();
        self.cursor = (self.cursor + 1) % self.detections.len();
        detection
    }
}
