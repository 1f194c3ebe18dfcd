use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use crossbeam_channel::{Receiver, Sender, after, select};
use image::RgbaImage;

use super::{
    compositor::RegionMaskCompositor,
    detector::PoseDetector,
    throttle::{CaptureGate, CaptureGuard},
};
use crate::{
    config::{PipelineSettings, SettingsHandle},
    error::Result,
    pose,
    remote::{HttpClassifier, RemoteClassifier},
    types::{ClassificationResult, Frame, PoseKeypointMap},
};

/// Fraction of the capture interval that must pass between two captures.
/// Slightly under one so timer jitter does not skip ticks.
const MIN_SPACING_FRACTION: f32 = 0.9;

/// Result of one periodic capture cycle.
#[derive(Debug)]
pub struct CaptureOutcome {
    /// Local heuristic label; `None` when the detector found no pose.
    pub classification: Option<ClassificationResult>,
    /// Privacy rendering; `None` when compositing failed for this capture.
    pub rendered: Option<RgbaImage>,
    /// Remote label for the masked rendering, when a remote classifier is
    /// configured and compositing succeeded.
    pub remote: Option<Result<ClassificationResult>>,
    pub timestamp: Instant,
}

impl CaptureOutcome {
    /// Remote label when it succeeded, otherwise the local one.
    pub fn best_classification(&self) -> Option<&ClassificationResult> {
        match &self.remote {
            Some(Ok(remote)) => Some(remote),
            _ => self.classification.as_ref(),
        }
    }
}

/// Most recent frame delivered to the pipeline; stills are taken from here.
#[derive(Clone, Debug, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<Frame>>>,
}

impl LatestFrame {
    pub fn store(&self, frame: Frame) {
        match self.slot.lock() {
            Ok(mut guard) => *guard = Some(frame),
            Err(poisoned) => *poisoned.into_inner() = Some(frame),
        }
    }

    pub fn get(&self) -> Option<Frame> {
        match self.slot.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Detect, classify, mask and optionally ask the remote classifier about a
/// single still.
pub struct CaptureProcessor<D: PoseDetector> {
    detector: D,
    compositor: RegionMaskCompositor,
    remote: Option<Box<dyn RemoteClassifier>>,
    http: Option<HttpClassifier>,
}

impl<D: PoseDetector> CaptureProcessor<D> {
    pub fn new(
        detector: D,
        compositor: RegionMaskCompositor,
        remote: Option<Box<dyn RemoteClassifier>>,
    ) -> Self {
        Self {
            detector,
            compositor,
            remote,
            http: None,
        }
    }

    pub fn process(&mut self, frame: &Frame, settings: &PipelineSettings) -> CaptureOutcome {
        let config = &settings.compositor;
        let detection = self.detector.detect(frame);
        if detection.is_none() {
            log::debug!("no detection in still capture");
        }
        let (pose, faces) = match detection {
            Some(d) => (d.pose, d.faces),
            None => (None, Vec::new()),
        };

        let classification = pose
            .as_ref()
            .map(|keypoints| pose::classify(keypoints, config.confidence_threshold));

        let Some(image) = frame.to_image() else {
            log::warn!(
                "still frame buffer does not match {}x{}",
                frame.width,
                frame.height
            );
            return CaptureOutcome {
                classification,
                rendered: None,
                remote: None,
                timestamp: frame.timestamp,
            };
        };

        let empty = PoseKeypointMap::new();
        let rendered = self.compositor.composite(
            &image,
            pose.as_ref().unwrap_or(&empty),
            &faces,
            config,
        );
        // Only the masked rendering ever leaves the process.
        let remote = rendered
            .as_ref()
            .and_then(|masked| self.classify_remotely(masked, settings));

        CaptureOutcome {
            classification,
            rendered,
            remote,
            timestamp: frame.timestamp,
        }
    }

    fn classify_remotely(
        &mut self,
        image: &RgbaImage,
        settings: &PipelineSettings,
    ) -> Option<Result<ClassificationResult>> {
        if let Some(remote) = &self.remote {
            return Some(remote.classify(image));
        }

        let url = settings.remote_url.as_deref()?;
        if self.http.as_ref().map(HttpClassifier::url) != Some(url) {
            match HttpClassifier::new(url) {
                Ok(client) => self.http = Some(client),
                Err(err) => return Some(Err(err)),
            }
        }
        let client = self.http.as_ref()?;
        let result = client.classify(image);
        if let Err(err) = &result {
            log::warn!("remote classification failed: {err}");
        }
        Some(result)
    }
}

struct CaptureJob {
    frame: Frame,
    _guard: CaptureGuard,
}

/// Spawns the interval timer and the capture worker. Both exit once
/// `stop_rx` disconnects.
pub(crate) fn start_workers<D: PoseDetector>(
    processor: CaptureProcessor<D>,
    settings: SettingsHandle,
    latest: LatestFrame,
    stop_rx: Receiver<()>,
    outcome_tx: Sender<CaptureOutcome>,
    running: Arc<AtomicBool>,
) -> [thread::JoinHandle<()>; 2] {
    let (job_tx, job_rx) = crossbeam_channel::bounded::<CaptureJob>(1);

    let timer_settings = settings.clone();
    let timer = thread::spawn(move || {
        log::info!("capture timer started");
        run_timer(timer_settings, latest, stop_rx, job_tx);
        log::info!("capture timer stopped");
    });

    let worker = thread::spawn(move || {
        let mut processor = processor;
        for job in job_rx.iter() {
            let snapshot = settings.snapshot();
            let outcome = processor.process(&job.frame, &snapshot);
            if !running.load(Ordering::Acquire) {
                log::debug!("pipeline stopped, discarding capture result");
                continue;
            }
            let _ = outcome_tx.try_send(outcome);
        }
        log::info!("capture worker stopped");
    });

    [timer, worker]
}

fn run_timer(
    settings: SettingsHandle,
    latest: LatestFrame,
    stop_rx: Receiver<()>,
    job_tx: Sender<CaptureJob>,
) {
    let gate = CaptureGate::new();
    loop {
        let interval = settings.snapshot().capture_interval();
        select! {
            recv(stop_rx) -> _ => break,
            recv(after(interval)) -> _ => {}
        }

        let Some(guard) = gate.try_begin(Instant::now(), interval.mul_f32(MIN_SPACING_FRACTION))
        else {
            log::debug!("previous capture still in flight, skipping tick");
            continue;
        };
        let Some(frame) = latest.get() else {
            log::debug!("no frame available for still capture");
            continue;
        };
        if job_tx
            .try_send(CaptureJob {
                frame,
                _guard: guard,
            })
            .is_err()
        {
            log::debug!("capture worker busy, dropping still");
        }
    }
}
