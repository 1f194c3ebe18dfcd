use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use image::RgbaImage;

use super::skeleton::{self, SkeletonStyle};
use crate::types::PoseKeypointMap;

pub const DEFAULT_CAPACITY: usize = 3;
pub const DEFAULT_FADE_DURATION: Duration = Duration::from_millis(500);
/// Opacity lost per step back in history.
const AGE_ALPHA_STEP: f32 = 0.3;

/// One buffered observation together with the opacity to draw it at.
#[derive(Clone, Debug, PartialEq)]
pub struct FadedObservation {
    pub keypoints: PoseKeypointMap,
    pub alpha: f32,
}

/// Short history of recent poses for the live overlay.
///
/// Owned by a single writer; renderers receive copies from [`snapshot`].
///
/// [`snapshot`]: TemporalOverlayBuffer::snapshot
#[derive(Debug)]
pub struct TemporalOverlayBuffer {
    observations: VecDeque<PoseKeypointMap>,
    capacity: usize,
    fade_duration: Duration,
    last_update: Option<Instant>,
    fading: bool,
}

impl Default for TemporalOverlayBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_FADE_DURATION)
    }
}

impl TemporalOverlayBuffer {
    pub fn new(capacity: usize, fade_duration: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            observations: VecDeque::with_capacity(capacity + 1),
            capacity,
            fade_duration,
            last_update: None,
            fading: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Applies new limits, evicting the oldest entries if the buffer shrank.
    pub fn reconfigure(&mut self, capacity: usize, fade_duration: Duration) {
        self.capacity = capacity.max(1);
        self.fade_duration = fade_duration;
        while self.observations.len() > self.capacity {
            self.observations.pop_front();
        }
    }

    /// Records a detection, or a miss when `observation` is `None`.
    ///
    /// A miss never evicts directly; it only runs the fade countdown from
    /// the last detection and clears everything once that has expired.
    pub fn update(&mut self, observation: Option<PoseKeypointMap>, now: Instant) {
        match observation {
            Some(keypoints) => {
                self.observations.push_back(keypoints);
                while self.observations.len() > self.capacity {
                    self.observations.pop_front();
                }
                self.last_update = Some(now);
                self.fading = false;
            }
            None => {
                if self.observations.is_empty() {
                    self.fading = false;
                    return;
                }
                self.fading = true;
                if self.elapsed(now) > self.fade_duration {
                    log::debug!("overlay fade expired, clearing {} poses", self.observations.len());
                    self.observations.clear();
                    self.fading = false;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn is_fading(&self) -> bool {
        self.fading
    }

    fn elapsed(&self, now: Instant) -> Duration {
        self.last_update
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(Duration::MAX)
    }

    /// Overall opacity: 1 while detections keep arriving, then decaying
    /// linearly to 0 over the fade window.
    pub fn fade_alpha(&self, now: Instant) -> f32 {
        if !self.fading {
            return 1.0;
        }
        if self.fade_duration.is_zero() {
            return 0.0;
        }
        let progress = self.elapsed(now).as_secs_f32() / self.fade_duration.as_secs_f32();
        1.0 - progress.min(1.0)
    }

    /// Copies of the buffered poses, newest first, each with the alpha it
    /// should be drawn with.
    pub fn snapshot(&self, now: Instant) -> Vec<FadedObservation> {
        let fade = self.fade_alpha(now);
        self.observations
            .iter()
            .rev()
            .enumerate()
            .map(|(index, keypoints)| FadedObservation {
                keypoints: keypoints.clone(),
                alpha: (fade * (1.0 - index as f32 * AGE_ALPHA_STEP)).max(0.0),
            })
            .collect()
    }
}

/// Draws a snapshot oldest first so the newest pose ends up on top.
pub fn render_overlay(
    canvas: &mut RgbaImage,
    observations: &[FadedObservation],
    threshold: f32,
    style: &SkeletonStyle,
) {
    for observation in observations.iter().rev() {
        skeleton::draw_skeleton_with_alpha(
            canvas,
            &observation.keypoints,
            threshold,
            style,
            observation.alpha,
        );
    }
}
