use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use pose_privacy::{
    PipelineSettings, PoseClassifier, RegionMaskCompositor,
    pipeline::{PoseDetector, RecordedDetector, SkeletonStyle},
    remote::{HttpClassifier, RemoteClassifier},
    types::Frame,
};

const USAGE: &str = "usage:
  pose-privacy <image> <detection.json> [--config settings.toml] [--out masked.png] [--remote URL]
  pose-privacy --camera <index> <detections.json> [--config settings.toml] [--seconds N]";

#[derive(Debug, Default)]
struct Args {
    positional: Vec<String>,
    config: Option<PathBuf>,
    out: Option<PathBuf>,
    remote: Option<String>,
    camera: Option<u32>,
    seconds: Option<u64>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .ok_or_else(|| anyhow!("{name} needs a value\n{USAGE}"))
        };
        match arg.as_str() {
            "--config" => args.config = Some(PathBuf::from(value("--config")?)),
            "--out" => args.out = Some(PathBuf::from(value("--out")?)),
            "--remote" => args.remote = Some(value("--remote")?),
            "--camera" => {
                args.camera = Some(value("--camera")?.parse().context("camera index")?)
            }
            "--seconds" => {
                args.seconds = Some(value("--seconds")?.parse().context("seconds")?)
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            _ => args.positional.push(arg),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    env_logger::init();

    let args = parse_args()?;
    let mut settings = match &args.config {
        Some(path) => PipelineSettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => PipelineSettings::default(),
    };
    if let Some(url) = &args.remote {
        settings.remote_url = Some(url.clone());
    }

    if let Some(index) = args.camera {
        let [detections] = args.positional.as_slice() else {
            bail!("{USAGE}");
        };
        return run_camera(index, PathBuf::from(detections), settings, args.seconds);
    }

    let [image_path, detection_path] = args.positional.as_slice() else {
        bail!("{USAGE}");
    };
    run_still(
        PathBuf::from(image_path),
        PathBuf::from(detection_path),
        args.out,
        settings,
    )
}

fn run_still(
    image_path: PathBuf,
    detection_path: PathBuf,
    out: Option<PathBuf>,
    settings: PipelineSettings,
) -> Result<()> {
    let image = image::open(&image_path)
        .with_context(|| format!("failed to open {}", image_path.display()))?
        .to_rgba8();
    let mut detector = RecordedDetector::load(&detection_path)
        .with_context(|| format!("failed to read detections from {}", detection_path.display()))?;

    let frame = Frame::from_image(image.clone(), std::time::Instant::now());
    let detection = detector.detect(&frame).unwrap_or_default();
    let config = settings.compositor;
    let pose = detection.pose.unwrap_or_default();

    let classification = PoseClassifier::new(config.confidence_threshold).classify(&pose);
    println!("{} -> {}", image_path.display(), classification.display_text());

    let compositor = RegionMaskCompositor::new(SkeletonStyle::highlight_hands());
    let rendered = compositor
        .composite(&image, &pose, &detection.faces, &config)
        .ok_or_else(|| anyhow!("compositing failed for {}", image_path.display()))?;

    if let Some(url) = &settings.remote_url {
        match HttpClassifier::new(url.as_str()).and_then(|client| client.classify(&rendered)) {
            Ok(remote) => println!("remote -> {}", remote.display_text()),
            Err(err) => log::warn!("remote classification failed: {err}"),
        }
    }

    let out = out.unwrap_or_else(|| image_path.with_extension("masked.png"));
    rendered
        .save(&out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!(
        "wrote {} ({}x{})",
        out.display(),
        rendered.width(),
        rendered.height()
    );
    Ok(())
}

#[cfg(feature = "camera-nokhwa")]
fn run_camera(
    index: u32,
    detections: PathBuf,
    settings: PipelineSettings,
    seconds: Option<u64>,
) -> Result<()> {
    use std::time::{Duration, Instant};

    use crossbeam_channel::select;
    use nokhwa::utils::CameraIndex;
    use pose_privacy::{Pipeline, SettingsHandle, pipeline::start_camera_stream};

    let detector = RecordedDetector::load(&detections)
        .with_context(|| format!("failed to read detections from {}", detections.display()))?;
    let pipeline = Pipeline::start_with(
        SettingsHandle::new(settings),
        detector.clone(),
        detector,
        RegionMaskCompositor::new(SkeletonStyle::highlight_hands()),
        None,
    );
    let camera = start_camera_stream(CameraIndex::Index(index), pipeline.frame_sink())?;
    log::info!("streaming from {}", camera.label());

    let deadline = Instant::now() + Duration::from_secs(seconds.unwrap_or(10));
    let mut captures = 0usize;
    while Instant::now() < deadline {
        select! {
            recv(pipeline.live_updates()) -> update => {
                if let Ok(update) = update {
                    log::info!(
                        "live: {} ({} poses in overlay)",
                        update.classification.display_text(),
                        update.overlay.len()
                    );
                }
            }
            recv(pipeline.capture_outcomes()) -> outcome => {
                if let Ok(outcome) = outcome {
                    captures += 1;
                    let label = outcome
                        .best_classification()
                        .map(|c| c.display_text())
                        .unwrap_or_else(|| "no pose".to_string());
                    if let Some(rendered) = &outcome.rendered {
                        let path = PathBuf::from(format!("capture-{captures:03}.png"));
                        if let Err(err) = rendered.save(&path) {
                            log::warn!("failed to write {}: {err}", path.display());
                        }
                    }
                    println!("capture {captures}: {label}");
                }
            }
            default(Duration::from_millis(200)) => {}
        }
    }

    camera.stop();
    pipeline.stop();
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn run_camera(
    _index: u32,
    _detections: PathBuf,
    _settings: PipelineSettings,
    _seconds: Option<u64>,
) -> Result<()> {
    Err(pose_privacy::PipelineError::DeviceUnavailable(
        "built without the camera-nokhwa feature".to_string(),
    )
    .into())
}
