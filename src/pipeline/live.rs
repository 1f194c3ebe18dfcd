use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use crossbeam_channel::{Receiver, Sender, select};

use super::{
    detector::PoseDetector,
    overlay::{FadedObservation, TemporalOverlayBuffer},
    throttle::FrameThrottle,
};
use crate::{
    config::{PipelineSettings, SettingsHandle},
    pose,
    types::{ClassificationResult, Frame, PoseKeypointMap},
};

/// What the live overlay needs for one processed frame.
#[derive(Clone, Debug)]
pub struct LiveUpdate {
    pub classification: ClassificationResult,
    pub detected: bool,
    pub overlay: Vec<FadedObservation>,
    pub timestamp: Instant,
}

/// Per-frame work of the continuous path: throttle, detect, classify and
/// update the overlay history.
pub struct LiveProcessor<D: PoseDetector> {
    detector: D,
    throttle: FrameThrottle,
    overlay: TemporalOverlayBuffer,
}

impl<D: PoseDetector> LiveProcessor<D> {
    pub fn new(detector: D, settings: &PipelineSettings) -> Self {
        Self {
            detector,
            throttle: FrameThrottle::new(settings.frame_interval()),
            overlay: TemporalOverlayBuffer::new(
                settings.overlay_capacity,
                settings.fade_duration(),
            ),
        }
    }

    /// `None` when the frame was dropped by the rate limiter.
    pub fn process(&mut self, frame: &Frame, settings: &PipelineSettings) -> Option<LiveUpdate> {
        self.throttle.set_interval(settings.frame_interval());
        if !self.throttle.admit(frame.timestamp) {
            return None;
        }
        self.overlay
            .reconfigure(settings.overlay_capacity, settings.fade_duration());

        let pose = self.detector.detect(frame).and_then(|d| d.pose);
        let threshold = settings.compositor.confidence_threshold;
        let classification = match &pose {
            Some(keypoints) => pose::classify(keypoints, threshold),
            None => {
                log::debug!("no pose detected in live frame");
                pose::classify(&PoseKeypointMap::new(), threshold)
            }
        };
        let detected = pose.is_some();
        self.overlay.update(pose, frame.timestamp);

        Some(LiveUpdate {
            classification,
            detected,
            overlay: self.overlay.snapshot(frame.timestamp),
            timestamp: frame.timestamp,
        })
    }
}

pub(crate) fn start_worker<D: PoseDetector>(
    detector: D,
    settings: SettingsHandle,
    frame_rx: Receiver<Frame>,
    stop_rx: Receiver<()>,
    update_tx: Sender<LiveUpdate>,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        log::info!("live pose worker started");
        let mut processor = LiveProcessor::new(detector, &settings.snapshot());

        while let Some(frame) = recv_latest_frame(&frame_rx, &stop_rx) {
            let snapshot = settings.snapshot();
            let Some(update) = processor.process(&frame, &snapshot) else {
                continue;
            };
            if !running.load(Ordering::Acquire) {
                break;
            }
            // Drop if the consumer is behind; the next frame supersedes it.
            let _ = update_tx.try_send(update);
        }
        log::info!("live pose worker stopped");
    })
}

/// Blocks for the next frame, then skips ahead to the newest one queued.
/// `None` once the pipeline is stopping or the frame source is gone.
fn recv_latest_frame(frame_rx: &Receiver<Frame>, stop_rx: &Receiver<()>) -> Option<Frame> {
    let mut frame = select! {
        recv(stop_rx) -> _ => return None,
        recv(frame_rx) -> msg => msg.ok()?,
    };
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Detection, Joint, Keypoint, PoseLabel};
    use std::time::Duration;

    fn frame_at(timestamp: Instant) -> Frame {
        Frame {
            rgba: vec![0; 16],
            width: 2,
            height: 2,
            timestamp,
        }
    }

    fn standing() -> Detection {
        Detection {
            pose: Some(
                [
                    (Joint::LeftHip, Keypoint::new(0.4, 0.5, 0.9)),
                    (Joint::RightHip, Keypoint::new(0.6, 0.5, 0.9)),
                    (Joint::LeftKnee, Keypoint::new(0.4, 0.65, 0.9)),
                    (Joint::RightKnee, Keypoint::new(0.6, 0.65, 0.9)),
                ]
                .into_iter()
                .collect(),
            ),
            faces: Vec::new(),
        }
    }

    #[test]
    fn frames_inside_interval_are_dropped() {
        let settings = PipelineSettings::default();
        let mut processor = LiveProcessor::new(|_: &Frame| Some(standing()), &settings);
        let start = Instant::now();
        assert!(processor.process(&frame_at(start), &settings).is_some());
        assert!(
            processor
                .process(&frame_at(start + Duration::from_millis(20)), &settings)
                .is_none()
        );
        assert!(
            processor
                .process(&frame_at(start + Duration::from_millis(100)), &settings)
                .is_some()
        );
    }

    #[test]
    fn frames_at_exactly_the_target_rate_are_all_processed() {
        for fps in [10.0_f32, 30.0] {
            let settings = PipelineSettings {
                processing_fps: fps,
                ..PipelineSettings::default()
            };
            let spacing = Duration::from_nanos((1e9 / f64::from(fps)).ceil() as u64);
            let mut processor = LiveProcessor::new(|_: &Frame| Some(standing()), &settings);
            let start = Instant::now();
            let frames = (fps as u32) * 10;
            let processed = (0..frames)
                .filter(|&i| {
                    processor
                        .process(&frame_at(start + spacing * i), &settings)
                        .is_some()
                })
                .count();
            assert_eq!(processed, frames as usize, "at {fps} fps");
        }
    }

    #[test]
    fn unsanitized_settings_do_not_panic() {
        let settings = PipelineSettings {
            processing_fps: 0.0,
            fade_duration_secs: -1.0,
            overlay_capacity: 0,
            ..PipelineSettings::default()
        };
        let mut processor = LiveProcessor::new(|_: &Frame| Some(standing()), &settings);
        let update = processor.process(&frame_at(Instant::now()), &settings).unwrap();
        assert_eq!(update.overlay.len(), 1);
    }

    #[test]
    fn detection_is_classified_and_buffered() {
        let settings = PipelineSettings::default();
        let mut processor = LiveProcessor::new(|_: &Frame| Some(standing()), &settings);
        let update = processor.process(&frame_at(Instant::now()), &settings).unwrap();
        assert_eq!(update.classification.pose_label(), Some(PoseLabel::Standing));
        assert!(update.detected);
        assert_eq!(update.overlay.len(), 1);
    }

    #[test]
    fn misses_report_unknown_and_fade_out() {
        let settings = PipelineSettings::default();
        let mut hits = 0;
        let detector = move |_: &Frame| {
            hits += 1;
            (hits == 1).then(standing)
        };
        let mut processor = LiveProcessor::new(detector, &settings);
        let start = Instant::now();
        processor.process(&frame_at(start), &settings).unwrap();

        let update = processor
            .process(&frame_at(start + Duration::from_millis(200)), &settings)
            .unwrap();
        assert_eq!(update.classification.pose_label(), Some(PoseLabel::Unknown));
        assert!(!update.detected);
        assert_eq!(update.overlay.len(), 1);
        assert!(update.overlay[0].alpha < 1.0);

        let update = processor
            .process(&frame_at(start + Duration::from_millis(700)), &settings)
            .unwrap();
        assert!(update.overlay.is_empty());
    }
}
