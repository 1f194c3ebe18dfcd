use crate::types::{ClassificationResult, Joint, Keypoint, PoseKeypointMap, PoseLabel};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

const TPOSE_VERTICAL_TOLERANCE: f32 = 0.1;
const TPOSE_MIN_EXTENSION: f32 = 0.2;
const STANDING_MAX_HIP_KNEE_GAP: f32 = 0.2;
// Gaps between the standing and sitting limits match neither rule.
const SITTING_MIN_HIP_KNEE_GAP: f32 = 0.3;
const WALKING_MIN_ANKLE_GAP: f32 = 0.1;

const ONE_HAND_UP_CONFIDENCE: f32 = 0.8;
const TPOSE_CONFIDENCE: f32 = 0.85;
const STANDING_CONFIDENCE: f32 = 0.9;
const SITTING_CONFIDENCE: f32 = 0.85;
const WALKING_CONFIDENCE: f32 = 0.8;
const RAISED_HANDS_CONFIDENCE: f32 = 0.75;
const UNKNOWN_CONFIDENCE: f32 = 0.5;

type Rule = fn(&PoseKeypointMap, f32) -> bool;

/// Priority order; the first rule that matches decides the label.
const CASCADE: [(PoseLabel, f32, Rule); 6] = [
    (PoseLabel::OneHandUp, ONE_HAND_UP_CONFIDENCE, is_one_hand_up),
    (PoseLabel::TPose, TPOSE_CONFIDENCE, is_t_pose),
    (PoseLabel::Standing, STANDING_CONFIDENCE, is_standing),
    (PoseLabel::Sitting, SITTING_CONFIDENCE, is_sitting),
    (PoseLabel::Walking, WALKING_CONFIDENCE, is_walking),
    (PoseLabel::RaisedHands, RAISED_HANDS_CONFIDENCE, is_raised_hands),
];

/// Heuristic pose classifier. Holds nothing but its joint confidence
/// threshold, so one instance can be shared freely between threads.
#[derive(Clone, Copy, Debug)]
pub struct PoseClassifier {
    threshold: f32,
}

impl Default for PoseClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl PoseClassifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn classify(&self, keypoints: &PoseKeypointMap) -> ClassificationResult {
        classify(keypoints, self.threshold)
    }
}

/// Runs the heuristic cascade. Missing or low-confidence joints make a rule
/// fail rather than erroring, so an empty map yields `Unknown`.
///
/// The heuristic path never fills `alternatives`.
pub fn classify(keypoints: &PoseKeypointMap, threshold: f32) -> ClassificationResult {
    let (label, confidence) = CASCADE
        .iter()
        .find(|(_, _, rule)| rule(keypoints, threshold))
        .map(|(label, confidence, _)| (*label, *confidence))
        .unwrap_or((PoseLabel::Unknown, UNKNOWN_CONFIDENCE));

    log::debug!(
        "classified {} joints as {} ({confidence})",
        keypoints.len(),
        label.display_name()
    );
    ClassificationResult::new(label, confidence)
}

fn joints<const N: usize>(
    keypoints: &PoseKeypointMap,
    threshold: f32,
    wanted: [Joint; N],
) -> Option<[Keypoint; N]> {
    let mut out = [Keypoint::new(0.0, 0.0, 0.0); N];
    for (slot, joint) in out.iter_mut().zip(wanted) {
        *slot = keypoints.confident(joint, threshold)?;
    }
    Some(out)
}

fn is_one_hand_up(keypoints: &PoseKeypointMap, threshold: f32) -> bool {
    let Some([left_wrist, right_wrist, nose]) = joints(
        keypoints,
        threshold,
        [Joint::LeftWrist, Joint::RightWrist, Joint::Nose],
    ) else {
        return false;
    };

    let left_up = left_wrist.y < nose.y;
    let right_up = right_wrist.y < nose.y;
    left_up != right_up
}

fn is_t_pose(keypoints: &PoseKeypointMap, threshold: f32) -> bool {
    let Some([left_wrist, right_wrist, left_shoulder, right_shoulder]) = joints(
        keypoints,
        threshold,
        [
            Joint::LeftWrist,
            Joint::RightWrist,
            Joint::LeftShoulder,
            Joint::RightShoulder,
        ],
    ) else {
        return false;
    };

    let aligned = (left_wrist.y - left_shoulder.y).abs() < TPOSE_VERTICAL_TOLERANCE
        && (right_wrist.y - right_shoulder.y).abs() < TPOSE_VERTICAL_TOLERANCE;
    let extended = left_shoulder.x - left_wrist.x > TPOSE_MIN_EXTENSION
        && right_wrist.x - right_shoulder.x > TPOSE_MIN_EXTENSION;
    aligned && extended
}

fn hip_knee_gaps(keypoints: &PoseKeypointMap, threshold: f32) -> Option<(f32, f32)> {
    let [left_hip, right_hip, left_knee, right_knee] = joints(
        keypoints,
        threshold,
        [
            Joint::LeftHip,
            Joint::RightHip,
            Joint::LeftKnee,
            Joint::RightKnee,
        ],
    )?;
    Some((left_knee.y - left_hip.y, right_knee.y - right_hip.y))
}

fn is_standing(keypoints: &PoseKeypointMap, threshold: f32) -> bool {
    hip_knee_gaps(keypoints, threshold).is_some_and(|(left, right)| {
        left.abs() < STANDING_MAX_HIP_KNEE_GAP && right.abs() < STANDING_MAX_HIP_KNEE_GAP
    })
}

fn is_sitting(keypoints: &PoseKeypointMap, threshold: f32) -> bool {
    hip_knee_gaps(keypoints, threshold).is_some_and(|(left, right)| {
        left > SITTING_MIN_HIP_KNEE_GAP && right > SITTING_MIN_HIP_KNEE_GAP
    })
}

fn is_walking(keypoints: &PoseKeypointMap, threshold: f32) -> bool {
    joints(
        keypoints,
        threshold,
        [Joint::LeftAnkle, Joint::RightAnkle],
    )
    .is_some_and(|[left, right]| (left.y - right.y).abs() > WALKING_MIN_ANKLE_GAP)
}

fn is_raised_hands(keypoints: &PoseKeypointMap, threshold: f32) -> bool {
    joints(
        keypoints,
        threshold,
        [
            Joint::LeftWrist,
            Joint::RightWrist,
            Joint::LeftShoulder,
            Joint::RightShoulder,
        ],
    )
    .is_some_and(|[left_wrist, right_wrist, left_shoulder, right_shoulder]| {
        left_wrist.y < left_shoulder.y && right_wrist.y < right_shoulder.y
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(points: &[(Joint, f32, f32, f32)]) -> PoseKeypointMap {
        points
            .iter()
            .map(|&(joint, x, y, c)| (joint, Keypoint::new(x, y, c)))
            .collect()
    }

    fn legs(knee_y: f32) -> PoseKeypointMap {
        pose(&[
            (Joint::LeftHip, 0.4, 0.5, 0.9),
            (Joint::RightHip, 0.6, 0.5, 0.9),
            (Joint::LeftKnee, 0.4, knee_y, 0.9),
            (Joint::RightKnee, 0.6, knee_y, 0.9),
        ])
    }

    fn assert_label(result: &ClassificationResult, label: PoseLabel, confidence: f32) {
        assert_eq!(result.label, label.display_name());
        assert!((result.confidence - confidence).abs() < 1e-6);
        assert!(result.alternatives.is_empty());
    }

    #[test]
    fn empty_map_is_unknown() {
        assert_label(&classify(&PoseKeypointMap::new(), 0.3), PoseLabel::Unknown, 0.5);
    }

    #[test]
    fn low_confidence_joints_are_ignored() {
        let mut keypoints = legs(0.65);
        for joint in [Joint::LeftHip, Joint::RightHip, Joint::LeftKnee, Joint::RightKnee] {
            keypoints.insert(joint, Keypoint::new(0.5, 0.5, 0.1));
        }
        assert_label(&classify(&keypoints, 0.3), PoseLabel::Unknown, 0.5);
    }

    #[test]
    fn straight_legs_are_standing() {
        assert_label(&classify(&legs(0.65), 0.3), PoseLabel::Standing, 0.9);
    }

    #[test]
    fn deep_hip_knee_gap_is_sitting() {
        assert_label(&classify(&legs(0.9), 0.3), PoseLabel::Sitting, 0.85);
    }

    #[test]
    fn gap_between_standing_and_sitting_matches_neither() {
        assert_label(&classify(&legs(0.75), 0.3), PoseLabel::Unknown, 0.5);
    }

    #[test]
    fn both_wrists_up_is_not_one_hand_up() {
        let keypoints = pose(&[
            (Joint::LeftWrist, 0.3, 0.2, 0.9),
            (Joint::RightWrist, 0.7, 0.2, 0.9),
            (Joint::Nose, 0.5, 0.3, 0.9),
        ]);
        assert_label(&classify(&keypoints, 0.3), PoseLabel::Unknown, 0.5);
    }

    #[test]
    fn both_wrists_up_with_shoulders_is_raised_hands() {
        let keypoints = pose(&[
            (Joint::LeftWrist, 0.3, 0.2, 0.9),
            (Joint::RightWrist, 0.7, 0.2, 0.9),
            (Joint::Nose, 0.5, 0.3, 0.9),
            (Joint::LeftShoulder, 0.4, 0.45, 0.9),
            (Joint::RightShoulder, 0.6, 0.45, 0.9),
        ]);
        assert_label(&classify(&keypoints, 0.3), PoseLabel::RaisedHands, 0.75);
    }

    #[test]
    fn single_raised_wrist_is_one_hand_up() {
        let keypoints = pose(&[
            (Joint::LeftWrist, 0.3, 0.2, 0.9),
            (Joint::RightWrist, 0.7, 0.6, 0.9),
            (Joint::Nose, 0.5, 0.3, 0.9),
        ]);
        assert_label(&classify(&keypoints, 0.3), PoseLabel::OneHandUp, 0.8);
    }

    #[test]
    fn arms_out_at_shoulder_height_is_t_pose() {
        let keypoints = pose(&[
            (Joint::LeftWrist, 0.1, 0.42, 0.9),
            (Joint::RightWrist, 0.9, 0.38, 0.9),
            (Joint::LeftShoulder, 0.4, 0.4, 0.9),
            (Joint::RightShoulder, 0.6, 0.4, 0.9),
        ]);
        assert_label(&classify(&keypoints, 0.3), PoseLabel::TPose, 0.85);
    }

    #[test]
    fn t_pose_outranks_standing() {
        let mut keypoints = legs(0.65);
        for (joint, kp) in pose(&[
            (Joint::LeftWrist, 0.1, 0.4, 0.9),
            (Joint::RightWrist, 0.9, 0.4, 0.9),
            (Joint::LeftShoulder, 0.4, 0.4, 0.9),
            (Joint::RightShoulder, 0.6, 0.4, 0.9),
        ])
        .iter()
        {
            keypoints.insert(joint, *kp);
        }
        assert_label(&classify(&keypoints, 0.3), PoseLabel::TPose, 0.85);
    }

    #[test]
    fn uneven_ankles_are_walking() {
        let keypoints = pose(&[
            (Joint::LeftAnkle, 0.4, 0.9, 0.8),
            (Joint::RightAnkle, 0.6, 0.75, 0.8),
        ]);
        assert_label(&classify(&keypoints, 0.3), PoseLabel::Walking, 0.8);
    }

    #[test]
    fn one_hand_up_outranks_t_pose() {
        let keypoints = pose(&[
            (Joint::LeftWrist, 0.1, 0.38, 0.9),
            (Joint::RightWrist, 0.9, 0.42, 0.9),
            (Joint::LeftShoulder, 0.4, 0.4, 0.9),
            (Joint::RightShoulder, 0.6, 0.4, 0.9),
            (Joint::Nose, 0.5, 0.4, 0.9),
        ]);
        assert!(is_t_pose(&keypoints, 0.3));
        assert_label(&classify(&keypoints, 0.3), PoseLabel::OneHandUp, 0.8);
    }

    #[test]
    fn walking_outranks_raised_hands() {
        let keypoints = pose(&[
            (Joint::LeftWrist, 0.4, 0.1, 0.9),
            (Joint::RightWrist, 0.6, 0.1, 0.9),
            (Joint::LeftShoulder, 0.4, 0.4, 0.9),
            (Joint::RightShoulder, 0.6, 0.4, 0.9),
            (Joint::LeftAnkle, 0.4, 0.95, 0.9),
            (Joint::RightAnkle, 0.6, 0.75, 0.9),
        ]);
        assert!(is_raised_hands(&keypoints, 0.3));
        assert_label(&classify(&keypoints, 0.3), PoseLabel::Walking, 0.8);
    }

    #[test]
    fn classification_is_deterministic() {
        let keypoints = legs(0.9);
        let classifier = PoseClassifier::default();
        assert_eq!(classifier.classify(&keypoints), classifier.classify(&keypoints));
    }
}
