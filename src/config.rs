use std::{
    path::Path,
    sync::{Arc, RwLock},
    time::Duration,
};

use serde::Deserialize;

use crate::error::Result;

const CAPTURE_INTERVAL_RANGE: (f32, f32) = (0.5, 10.0);
const PROCESSING_FPS_RANGE: (f32, f32) = (1.0, 30.0);
const BLUR_RADIUS_RANGE: (f32, f32) = (0.0, 100.0);

const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_FADE_DURATION: Duration = Duration::from_millis(500);

/// Per-call settings for classification and masking.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_blur_radius")]
    pub blur_radius: f32,
    #[serde(default = "default_preserve_faces")]
    pub preserve_faces: bool,
    #[serde(default = "default_max_output_dimension")]
    pub max_output_dimension: f32,
}

fn default_confidence_threshold() -> f32 {
    0.3
}

fn default_blur_radius() -> f32 {
    30.0
}

fn default_preserve_faces() -> bool {
    true
}

fn default_max_output_dimension() -> f32 {
    640.0
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            blur_radius: default_blur_radius(),
            preserve_faces: default_preserve_faces(),
            max_output_dimension: default_max_output_dimension(),
        }
    }
}

/// Everything the host can tune while the pipeline runs.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_capture_interval_secs")]
    pub capture_interval_secs: f32,
    #[serde(default = "default_processing_fps")]
    pub processing_fps: f32,
    #[serde(default = "default_overlay_capacity")]
    pub overlay_capacity: usize,
    #[serde(default = "default_fade_duration_secs")]
    pub fade_duration_secs: f32,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub compositor: Configuration,
}

fn default_capture_interval_secs() -> f32 {
    2.0
}

fn default_processing_fps() -> f32 {
    10.0
}

fn default_overlay_capacity() -> usize {
    3
}

fn default_fade_duration_secs() -> f32 {
    0.5
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            capture_interval_secs: default_capture_interval_secs(),
            processing_fps: default_processing_fps(),
            overlay_capacity: default_overlay_capacity(),
            fade_duration_secs: default_fade_duration_secs(),
            remote_url: None,
            compositor: Configuration::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: PipelineSettings = toml::from_str(text)?;
        Ok(settings.sanitized())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Clamps host-facing values into the ranges the controls expose.
    pub fn sanitized(mut self) -> Self {
        self.capture_interval_secs = clamp_or(
            self.capture_interval_secs,
            CAPTURE_INTERVAL_RANGE,
            default_capture_interval_secs(),
        );
        self.processing_fps =
            clamp_or(self.processing_fps, PROCESSING_FPS_RANGE, default_processing_fps());
        self.compositor.blur_radius = clamp_or(
            self.compositor.blur_radius,
            BLUR_RADIUS_RANGE,
            default_blur_radius(),
        );
        self.compositor.confidence_threshold = clamp_or(
            self.compositor.confidence_threshold,
            (0.0, 1.0),
            default_confidence_threshold(),
        );
        if !(self.compositor.max_output_dimension.is_finite()
            && self.compositor.max_output_dimension >= 1.0)
        {
            self.compositor.max_output_dimension = default_max_output_dimension();
        }
        self.overlay_capacity = self.overlay_capacity.max(1);
        if !(self.fade_duration_secs.is_finite() && self.fade_duration_secs >= 0.0) {
            self.fade_duration_secs = default_fade_duration_secs();
        }
        self
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::try_from_secs_f64(f64::from(self.capture_interval_secs))
            .unwrap_or(DEFAULT_CAPTURE_INTERVAL)
    }

    /// Minimum spacing between processed live frames, rounded down to whole
    /// nanoseconds so frames arriving exactly at `processing_fps` all pass.
    pub fn frame_interval(&self) -> Duration {
        let nanos = 1e9 / f64::from(self.processing_fps);
        if nanos.is_finite() && nanos > 0.0 {
            Duration::from_nanos(nanos.floor() as u64)
        } else {
            DEFAULT_FRAME_INTERVAL
        }
    }

    pub fn fade_duration(&self) -> Duration {
        Duration::try_from_secs_f64(f64::from(self.fade_duration_secs))
            .unwrap_or(DEFAULT_FADE_DURATION)
    }
}

fn clamp_or(value: f32, (min, max): (f32, f32), fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

/// Shared, replace-only store of the current settings.
///
/// Writers publish a whole new snapshot; workers take one snapshot at the
/// start of each cycle and never observe a half-updated value.
#[derive(Clone, Debug, Default)]
pub struct SettingsHandle {
    current: Arc<RwLock<Arc<PipelineSettings>>>,
}

impl SettingsHandle {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(settings.sanitized()))),
        }
    }

    pub fn snapshot(&self) -> Arc<PipelineSettings> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, settings: PipelineSettings) {
        let next = Arc::new(settings.sanitized());
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Applies `edit` to a copy of the current snapshot and publishes it.
    pub fn update<F>(&self, edit: F)
    where
        F: FnOnce(&mut PipelineSettings),
    {
        let mut next = (*self.snapshot()).clone();
        edit(&mut next);
        self.replace(next);
    }
}
