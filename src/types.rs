use std::{collections::BTreeMap, time::Instant};

use image::RgbaImage;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn from_image(image: RgbaImage, timestamp: Instant) -> Self {
        let (width, height) = image.dimensions();
        Self {
            rgba: image.into_raw(),
            width,
            height,
            timestamp,
        }
    }

    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
    }
}

/// Named body and face landmarks reported by the pose detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Joint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    Neck,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    Root,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    pub const ALL: [Joint; 19] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::Neck,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::Root,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];
}

/// A detected landmark in normalized image space, origin bottom-left.
///
/// Confidence is expected in `[0, 1]` but is not clamped here; values are
/// only ever compared against a threshold.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    pub fn is_confident(&self, threshold: f32) -> bool {
        self.confidence > threshold
    }
}

/// At most one keypoint per joint for a single observation. Occluded joints
/// are simply absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseKeypointMap {
    points: BTreeMap<Joint, Keypoint>,
}

impl PoseKeypointMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, joint: Joint, keypoint: Keypoint) -> Option<Keypoint> {
        self.points.insert(joint, keypoint)
    }

    pub fn get(&self, joint: Joint) -> Option<&Keypoint> {
        self.points.get(&joint)
    }

    /// The keypoint for `joint` if its confidence is above `threshold`.
    pub fn confident(&self, joint: Joint, threshold: f32) -> Option<Keypoint> {
        self.points
            .get(&joint)
            .copied()
            .filter(|kp| kp.is_confident(threshold))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Joint, &Keypoint)> {
        self.points.iter().map(|(joint, kp)| (*joint, kp))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl FromIterator<(Joint, Keypoint)> for PoseKeypointMap {
    fn from_iter<I: IntoIterator<Item = (Joint, Keypoint)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Normalized face box, same coordinate convention as [`Keypoint`]: `(x, y)`
/// is the bottom-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceRectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Everything the external detector reports for one frame or still.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub pose: Option<PoseKeypointMap>,
    #[serde(default)]
    pub faces: Vec<FaceRectangle>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PoseLabel {
    Standing,
    Sitting,
    Walking,
    RaisedHands,
    TPose,
    OneHandUp,
    Unknown,
}

impl PoseLabel {
    pub fn display_name(&self) -> &'static str {
        match self {
            PoseLabel::Standing => "Standing",
            PoseLabel::Sitting => "Sitting",
            PoseLabel::Walking => "Walking",
            PoseLabel::RaisedHands => "Raised Hands",
            PoseLabel::TPose => "T-Pose",
            PoseLabel::OneHandUp => "One Hand Up",
            PoseLabel::Unknown => "Unknown",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            PoseLabel::Standing,
            PoseLabel::Sitting,
            PoseLabel::Walking,
            PoseLabel::RaisedHands,
            PoseLabel::TPose,
            PoseLabel::OneHandUp,
            PoseLabel::Unknown,
        ]
        .into_iter()
        .find(|label| label.display_name().eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub label: String,
    pub confidence: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: f32,
    /// Descending confidence when populated.
    pub alternatives: Vec<Alternative>,
}

impl ClassificationResult {
    pub fn new(label: PoseLabel, confidence: f32) -> Self {
        Self {
            label: label.display_name().to_string(),
            confidence,
            alternatives: Vec::new(),
        }
    }

    /// Maps the label back onto the closed taxonomy. Labels from the remote
    /// classifier may fall outside it.
    pub fn pose_label(&self) -> Option<PoseLabel> {
        PoseLabel::from_name(&self.label)
    }

    pub fn display_text(&self) -> String {
        format!("{} ({:.0}%)", self.label, self.confidence * 100.0)
    }
}
