//! Privacy rendering of still captures.
//!
//! The body region stays sharp while everything else is blurred; detected
//! faces are blurred as well when `preserve_faces` is set. The skeleton is
//! drawn on top and the result is downscaled to the configured maximum.

use fast_image_resize as fir;
use image::{GrayImage, Luma, RgbaImage, imageops};
use rayon::prelude::*;

use super::skeleton::{self, SkeletonStyle};
use crate::{
    config::Configuration,
    error::{PipelineError, Result},
    types::{FaceRectangle, Joint, PoseKeypointMap},
};

pub const BODY_REGION_EXPANSION: f32 = 1.5;

/// Mask value selecting the blurred image.
pub const MASK_BLURRED: u8 = 255;
/// Mask value selecting the original image.
pub const MASK_ORIGINAL: u8 = 0;

const BODY_JOINTS: [Joint; 4] = [
    Joint::LeftShoulder,
    Joint::RightShoulder,
    Joint::LeftHip,
    Joint::RightHip,
];

/// Axis-aligned rectangle in top-left-origin pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BodyRegion {
    /// Bounding box of the confident shoulder and hip joints, scaled by
    /// [`BODY_REGION_EXPANSION`] about its center.
    ///
    /// With no qualifying joints the raw bounds are inverted infinities;
    /// that case, and any other non-finite or negative box, is reported as
    /// `None`.
    pub fn from_keypoints(
        pose: &PoseKeypointMap,
        width: u32,
        height: u32,
        threshold: f32,
    ) -> Option<Self> {
        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);

        for joint in BODY_JOINTS {
            if let Some(kp) = pose.confident(joint, threshold) {
                let (px, py) = skeleton::to_pixel(&kp, width, height);
                min_x = min_x.min(px);
                min_y = min_y.min(py);
                max_x = max_x.max(px);
                max_y = max_y.max(py);
            }
        }

        let (box_w, box_h) = (max_x - min_x, max_y - min_y);
        let center = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);
        let region = BodyRegion {
            x: center.0 - box_w * BODY_REGION_EXPANSION / 2.0,
            y: center.1 - box_h * BODY_REGION_EXPANSION / 2.0,
            width: box_w * BODY_REGION_EXPANSION,
            height: box_h * BODY_REGION_EXPANSION,
        };
        region.is_valid().then_some(region)
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Converts a normalized bottom-left-origin face box to pixel space.
pub fn face_to_pixels(face: &FaceRectangle, width: u32, height: u32) -> BodyRegion {
    BodyRegion {
        x: face.x * width as f32,
        y: (1.0 - face.y - face.height) * height as f32,
        width: face.width * width as f32,
        height: face.height * height as f32,
    }
}

/// Gaussian blur of the whole image. A zero radius is a no-op; a radius
/// that is not a finite number leaves the image untouched.
pub fn blur(image: &RgbaImage, radius: f32) -> RgbaImage {
    if !radius.is_finite() || radius < 0.0 {
        log::warn!("blur radius {radius} unusable, keeping original image");
        return image.clone();
    }
    if radius == 0.0 {
        return image.clone();
    }
    imageops::blur(image, radius)
}

/// White selects the blurred image, black the original. The body region is
/// black; with `preserve_faces` every face box is painted white again, so
/// faces end up blurred even inside the body.
pub fn build_mask(
    width: u32,
    height: u32,
    body: Option<&BodyRegion>,
    faces: &[FaceRectangle],
    preserve_faces: bool,
) -> GrayImage {
    let mut mask = GrayImage::from_pixel(width, height, Luma([MASK_BLURRED]));
    if let Some(body) = body {
        fill_rect(&mut mask, body, MASK_ORIGINAL);
    }
    if preserve_faces {
        for face in faces {
            fill_rect(&mut mask, &face_to_pixels(face, width, height), MASK_BLURRED);
        }
    }
    mask
}

fn fill_rect(mask: &mut GrayImage, rect: &BodyRegion, value: u8) {
    if !rect.is_valid() {
        return;
    }
    let (width, height) = mask.dimensions();
    let x0 = rect.x.floor().clamp(0.0, width as f32) as u32;
    let y0 = rect.y.floor().clamp(0.0, height as f32) as u32;
    let x1 = (rect.x + rect.width).ceil().clamp(0.0, width as f32) as u32;
    let y1 = (rect.y + rect.height).ceil().clamp(0.0, height as f32) as u32;
    for y in y0..y1 {
        for x in x0..x1 {
            mask.put_pixel(x, y, Luma([value]));
        }
    }
}

/// Per-pixel select between `blurred` (mask white) and `original` (mask
/// black). Returns `None` when the three inputs disagree on size.
pub fn blend(original: &RgbaImage, blurred: &RgbaImage, mask: &GrayImage) -> Option<RgbaImage> {
    if original.dimensions() != blurred.dimensions() || original.dimensions() != mask.dimensions()
    {
        return None;
    }

    let (width, height) = original.dimensions();
    let mut out = original.as_raw().clone();
    out.par_chunks_mut(4)
        .zip(blurred.as_raw().par_chunks_exact(4))
        .zip(mask.as_raw().par_iter())
        .for_each(|((dst, src), &m)| {
            if m >= 128 {
                dst.copy_from_slice(src);
            }
        });
    RgbaImage::from_raw(width, height, out)
}

/// Uniform downscale so the larger side equals `max_dimension`. Images
/// already within bounds are returned as-is.
pub fn resize_to_fit(image: RgbaImage, max_dimension: f32) -> Result<RgbaImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Ok(image);
    }
    let ratio = (max_dimension / width as f32).min(max_dimension / height as f32);
    if ratio.is_nan() || ratio >= 1.0 {
        return Ok(image);
    }

    let new_w = (width as f32 * ratio).round().max(1.0) as u32;
    let new_h = (height as f32 * ratio).round().max(1.0) as u32;

    let src_image =
        fir::images::Image::from_vec_u8(width, height, image.into_raw(), fir::PixelType::U8x4)
            .map_err(|err| PipelineError::CompositingFailure(format!("resize source: {err}")))?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .map_err(|err| PipelineError::CompositingFailure(format!("resize: {err}")))?;

    RgbaImage::from_raw(new_w, new_h, dst_image.into_vec()).ok_or_else(|| {
        PipelineError::CompositingFailure("resized buffer has unexpected length".to_string())
    })
}

#[derive(Clone, Debug, Default)]
pub struct RegionMaskCompositor {
    style: SkeletonStyle,
}

impl RegionMaskCompositor {
    pub fn new(style: SkeletonStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &SkeletonStyle {
        &self.style
    }

    /// Renders the privacy view of `image`. `None` means this capture could
    /// not be processed; the next one is unaffected.
    pub fn composite(
        &self,
        image: &RgbaImage,
        pose: &PoseKeypointMap,
        faces: &[FaceRectangle],
        config: &Configuration,
    ) -> Option<RgbaImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            log::warn!("refusing to composite an empty image");
            return None;
        }

        let body = BodyRegion::from_keypoints(pose, width, height, config.confidence_threshold);
        if body.is_none() {
            log::debug!("no body region in capture, blurring whole frame");
        }

        let blurred = blur(image, config.blur_radius);
        let mask = build_mask(width, height, body.as_ref(), faces, config.preserve_faces);
        let mut blended = blend(image, &blurred, &mask).unwrap_or_else(|| {
            log::warn!("mask blend produced no output, using original image");
            image.clone()
        });

        skeleton::draw_skeleton(
            &mut blended,
            pose,
            config.confidence_threshold,
            &self.style,
        );

        match resize_to_fit(blended, config.max_output_dimension) {
            Ok(out) => Some(out),
            Err(err) => {
                log::warn!("{err}");
                None
            }
        }
    }

    /// Decodes `bytes` and composites the result; undecodable input gives
    /// `None`.
    pub fn composite_encoded(
        &self,
        bytes: &[u8],
        pose: &PoseKeypointMap,
        faces: &[FaceRectangle],
        config: &Configuration,
    ) -> Option<RgbaImage> {
        let image = match image::load_from_memory(bytes) {
            Ok(image) => image.to_rgba8(),
            Err(err) => {
                log::warn!("failed to decode capture: {err}");
                return None;
            }
        };
        self.composite(&image, pose, faces, config)
    }
}
