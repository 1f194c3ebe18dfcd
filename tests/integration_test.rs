use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use pose_privacy::{
    Configuration, Detection, Frame, Joint, Keypoint, Pipeline, PipelineSettings,
    PoseKeypointMap, PoseLabel, RegionMaskCompositor, SettingsHandle, TemporalOverlayBuffer,
    classify,
    pipeline::{BodyRegion, RecordedDetector},
};

fn keypoints(points: &[(Joint, f32, f32, f32)]) -> PoseKeypointMap {
    points
        .iter()
        .map(|&(joint, x, y, c)| (joint, Keypoint::new(x, y, c)))
        .collect()
}

#[test]
fn scenario_a_standing() {
    let pose = keypoints(&[
        (Joint::LeftHip, 0.4, 0.5, 0.9),
        (Joint::RightHip, 0.6, 0.5, 0.9),
        (Joint::LeftKnee, 0.4, 0.65, 0.9),
        (Joint::RightKnee, 0.6, 0.65, 0.9),
    ]);
    let result = classify(&pose, 0.3);
    assert_eq!(result.label, "Standing");
    assert!((result.confidence - 0.9).abs() < 1e-6);
}

#[test]
fn scenario_b_sitting() {
    let pose = keypoints(&[
        (Joint::LeftHip, 0.4, 0.5, 0.9),
        (Joint::RightHip, 0.6, 0.5, 0.9),
        (Joint::LeftKnee, 0.4, 0.9, 0.9),
        (Joint::RightKnee, 0.6, 0.9, 0.9),
    ]);
    let result = classify(&pose, 0.3);
    assert_eq!(result.pose_label(), Some(PoseLabel::Sitting));
    assert!((result.confidence - 0.85).abs() < 1e-6);
}

#[test]
fn scenario_c_both_wrists_up_without_shoulders() {
    let pose = keypoints(&[
        (Joint::LeftWrist, 0.3, 0.2, 0.9),
        (Joint::RightWrist, 0.7, 0.2, 0.9),
        (Joint::Nose, 0.5, 0.3, 0.9),
    ]);
    assert_eq!(classify(&pose, 0.3).pose_label(), Some(PoseLabel::Unknown));
}

#[test]
fn scenario_d_empty_map() {
    let result = classify(&PoseKeypointMap::new(), 0.3);
    assert_eq!(result.label, "Unknown");
    assert!((result.confidence - 0.5).abs() < 1e-6);
    assert!(result.alternatives.is_empty());
}

#[test]
fn all_joints_below_threshold_is_unknown() {
    let pose: PoseKeypointMap = Joint::ALL
        .iter()
        .map(|&joint| (joint, Keypoint::new(0.5, 0.5, 0.2)))
        .collect();
    assert_eq!(classify(&pose, 0.3).pose_label(), Some(PoseLabel::Unknown));
}

#[test]
fn composite_of_small_image_keeps_dimensions() {
    let image = RgbaImage::from_pixel(320, 240, Rgba([30, 60, 90, 255]));
    let pose = keypoints(&[
        (Joint::LeftShoulder, 0.4, 0.7, 0.9),
        (Joint::RightShoulder, 0.6, 0.7, 0.9),
        (Joint::LeftHip, 0.4, 0.4, 0.9),
        (Joint::RightHip, 0.6, 0.4, 0.9),
    ]);
    let out = RegionMaskCompositor::default()
        .composite(&image, &pose, &[], &Configuration::default())
        .unwrap();
    assert_eq!(out.dimensions(), (320, 240));
}

#[test]
fn composite_of_large_image_is_downscaled() {
    let image = RgbaImage::from_pixel(1600, 1200, Rgba([30, 60, 90, 255]));
    let config = Configuration {
        blur_radius: 2.0,
        ..Configuration::default()
    };
    let out = RegionMaskCompositor::default()
        .composite(&image, &PoseKeypointMap::new(), &[], &config)
        .unwrap();
    assert_eq!(out.dimensions(), (640, 480));
}

#[test]
fn body_region_doubles_with_image() {
    let pose = keypoints(&[
        (Joint::LeftShoulder, 0.35, 0.8, 0.9),
        (Joint::RightHip, 0.55, 0.3, 0.9),
    ]);
    let a = BodyRegion::from_keypoints(&pose, 300, 200, 0.3).unwrap();
    let b = BodyRegion::from_keypoints(&pose, 600, 400, 0.3).unwrap();
    assert!((b.width - 2.0 * a.width).abs() < 1e-3);
    assert!((b.height - 2.0 * a.height).abs() < 1e-3);
    assert!((b.center().0 - 2.0 * a.center().0).abs() < 1e-3);
    assert!((b.center().1 - 2.0 * a.center().1).abs() < 1e-3);
}

#[test]
fn overlay_buffer_is_bounded_and_empties_after_fade() {
    let start = Instant::now();
    let mut buffer = TemporalOverlayBuffer::new(3, Duration::from_millis(500));
    for i in 0..10 {
        let now = start + Duration::from_millis(i * 100);
        let observation = (i % 3 != 2).then(|| keypoints(&[(Joint::Nose, 0.5, 0.5, 0.9)]));
        buffer.update(observation, now);
        assert!(buffer.len() <= 3);
    }
    buffer.update(None, start + Duration::from_secs(5));
    assert!(buffer.is_empty());
}

#[test]
fn pipeline_emits_live_and_capture_results() {
    let settings = PipelineSettings {
        capture_interval_secs: 0.5,
        ..PipelineSettings::default()
    };
    let detector = RecordedDetector::new(vec![Some(Detection {
        pose: Some(keypoints(&[
            (Joint::LeftHip, 0.4, 0.5, 0.9),
            (Joint::RightHip, 0.6, 0.5, 0.9),
            (Joint::LeftKnee, 0.4, 0.65, 0.9),
            (Joint::RightKnee, 0.6, 0.65, 0.9),
        ])),
        faces: Vec::new(),
    })]);
    let pipeline = Pipeline::start(
        SettingsHandle::new(settings),
        detector.clone(),
        detector,
    );

    let image = RgbaImage::from_pixel(64, 48, Rgba([200, 200, 200, 255]));
    assert!(pipeline.submit_frame(Frame::from_image(image, Instant::now())));

    let live = pipeline
        .live_updates()
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(live.classification.pose_label(), Some(PoseLabel::Standing));

    let capture = pipeline
        .capture_outcomes()
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(
        capture.best_classification().and_then(|c| c.pose_label()),
        Some(PoseLabel::Standing)
    );
    assert_eq!(capture.rendered.unwrap().dimensions(), (64, 48));

    pipeline.stop();
}
