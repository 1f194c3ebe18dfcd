#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod capture;
pub mod compositor;
pub mod detector;
pub mod live;
pub mod overlay;
pub mod skeleton;
pub mod throttle;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraStream, start_camera_stream};
pub use capture::{CaptureOutcome, CaptureProcessor, LatestFrame};
pub use compositor::{BodyRegion, RegionMaskCompositor};
pub use detector::{PoseDetector, RecordedDetector};
pub use live::{LiveProcessor, LiveUpdate};
pub use overlay::{FadedObservation, TemporalOverlayBuffer, render_overlay};
pub use skeleton::SkeletonStyle;

use crate::{config::SettingsHandle, remote::RemoteClassifier, types::Frame};

const LIVE_UPDATE_QUEUE: usize = 4;
const CAPTURE_OUTCOME_QUEUE: usize = 2;

/// Cloneable entry point for frame producers such as a camera thread.
#[derive(Clone, Debug)]
pub struct FrameSink {
    frame_tx: Sender<Frame>,
    latest: LatestFrame,
    running: Arc<AtomicBool>,
}

impl FrameSink {
    /// Hands a frame to both cadences. Returns `false` once the pipeline has
    /// stopped. A busy live worker simply misses this frame.
    pub fn submit(&self, frame: Frame) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        self.latest.store(frame.clone());
        match self.frame_tx.try_send(frame) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Owns the continuous (live overlay) and periodic (still capture) paths.
///
/// Results arrive on [`live_updates`] and [`capture_outcomes`]. Stopping
/// cancels the capture timer, lets an in-flight capture finish and throws
/// its result away.
///
/// [`live_updates`]: Pipeline::live_updates
/// [`capture_outcomes`]: Pipeline::capture_outcomes
pub struct Pipeline {
    settings: SettingsHandle,
    sink: FrameSink,
    running: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    handles: Vec<thread::JoinHandle<()>>,
    live_rx: Receiver<LiveUpdate>,
    capture_rx: Receiver<CaptureOutcome>,
}

impl Pipeline {
    pub fn start<L, S>(settings: SettingsHandle, live_detector: L, still_detector: S) -> Self
    where
        L: PoseDetector,
        S: PoseDetector,
    {
        Self::start_with(
            settings,
            live_detector,
            still_detector,
            RegionMaskCompositor::default(),
            None,
        )
    }

    pub fn start_with<L, S>(
        settings: SettingsHandle,
        live_detector: L,
        still_detector: S,
        compositor: RegionMaskCompositor,
        remote: Option<Box<dyn RemoteClassifier>>,
    ) -> Self
    where
        L: PoseDetector,
        S: PoseDetector,
    {
        let running = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let (frame_tx, frame_rx) = bounded::<Frame>(1);
        let (live_tx, live_rx) = bounded(LIVE_UPDATE_QUEUE);
        let (capture_tx, capture_rx) = bounded(CAPTURE_OUTCOME_QUEUE);
        let latest = LatestFrame::default();

        let live = live::start_worker(
            live_detector,
            settings.clone(),
            frame_rx,
            stop_rx.clone(),
            live_tx,
            running.clone(),
        );
        let [timer, worker] = capture::start_workers(
            CaptureProcessor::new(still_detector, compositor, remote),
            settings.clone(),
            latest.clone(),
            stop_rx,
            capture_tx,
            running.clone(),
        );

        let snapshot = settings.snapshot();
        log::info!(
            "pipeline started: {:.0} fps live, capture every {:.1}s",
            snapshot.processing_fps,
            snapshot.capture_interval_secs
        );

        Self {
            sink: FrameSink {
                frame_tx,
                latest,
                running: running.clone(),
            },
            settings,
            running,
            stop_tx: Some(stop_tx),
            handles: vec![live, timer, worker],
            live_rx,
            capture_rx,
        }
    }

    pub fn frame_sink(&self) -> FrameSink {
        self.sink.clone()
    }

    pub fn submit_frame(&self, frame: Frame) -> bool {
        self.sink.submit(frame)
    }

    pub fn live_updates(&self) -> &Receiver<LiveUpdate> {
        &self.live_rx
    }

    pub fn capture_outcomes(&self) -> &Receiver<CaptureOutcome> {
        &self.capture_rx
    }

    /// Settings changes apply from the next cycle of each cadence.
    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        // Disconnecting the stop channel wakes every worker blocked in select.
        self.stop_tx.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("pipeline worker panicked");
            }
        }
        log::info!("pipeline stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.shutdown();
        }
    }
}
