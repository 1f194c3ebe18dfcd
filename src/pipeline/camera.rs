use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use nokhwa::{
    Camera,
    pixel_format::{RgbAFormat, RgbFormat},
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
};

use super::FrameSink;
use crate::{
    error::{PipelineError, Result},
    types::Frame,
};

/// Tried in order until one opens.
const FORMAT_PREFERENCES: [RequestedFormatType; 2] = [
    RequestedFormatType::AbsoluteHighestFrameRate,
    RequestedFormatType::None,
];

fn open_camera(index: &CameraIndex) -> Result<Camera> {
    let mut failures = Vec::new();
    for preference in FORMAT_PREFERENCES {
        let opened = Camera::new(index.clone(), RequestedFormat::new::<RgbFormat>(preference))
            .and_then(|mut camera| camera.open_stream().map(|()| camera));
        match opened {
            Ok(camera) => return Ok(camera),
            Err(err) => failures.push(err.to_string()),
        }
    }
    Err(PipelineError::DeviceUnavailable(format!(
        "camera {index}: {}",
        failures.join("; ")
    )))
}

/// Handle on the thread that feeds camera frames into a pipeline.
#[derive(Debug)]
pub struct CameraStream {
    label: String,
    halt: Arc<AtomicBool>,
    reader: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stop(mut self) {
        self.halt_reader();
    }

    fn halt_reader(&mut self) {
        self.halt.store(true, Ordering::Release);
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                log::error!("camera reader panicked");
            }
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.halt_reader();
    }
}

/// Opens camera `index` and forwards every decoded frame into `sink` until
/// the stream is stopped or the pipeline rejects frames.
pub fn start_camera_stream(index: CameraIndex, sink: FrameSink) -> Result<CameraStream> {
    let halt = Arc::new(AtomicBool::new(false));
    let reader_halt = halt.clone();
    let (opened_tx, opened_rx) = crossbeam_channel::bounded::<Result<String>>(1);

    // nokhwa cameras are not Send; open on the reader thread.
    let reader = thread::spawn(move || {
        let mut camera = match open_camera(&index) {
            Ok(camera) => camera,
            Err(err) => {
                let _ = opened_tx.send(Err(err));
                return;
            }
        };
        let label = camera.info().human_name();
        log::info!("camera opened: {label} ({})", camera.camera_format());
        let _ = opened_tx.send(Ok(label));

        while !reader_halt.load(Ordering::Acquire) {
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::warn!("camera read failed: {err}");
                    continue;
                }
            };
            let resolution = buffer.resolution();
            let Ok(decoded) = buffer.decode_image::<RgbAFormat>() else {
                log::warn!("dropping undecodable camera frame");
                continue;
            };

            let frame = Frame {
                rgba: decoded.into_raw(),
                width: resolution.width_x,
                height: resolution.height_y,
                timestamp: Instant::now(),
            };
            if !sink.submit(frame) {
                log::info!("pipeline no longer accepts frames, releasing camera");
                break;
            }
        }

        if let Err(err) = camera.stop_stream() {
            log::warn!("camera did not stop cleanly: {err}");
        }
    });

    let label = match opened_rx.recv() {
        Ok(Ok(label)) => label,
        Ok(Err(err)) => {
            let _ = reader.join();
            return Err(err);
        }
        Err(_) => {
            let _ = reader.join();
            return Err(PipelineError::DeviceUnavailable(
                "camera reader exited before opening the device".to_string(),
            ));
        }
    };

    Ok(CameraStream {
        label,
        halt,
        reader: Some(reader),
    })
}
