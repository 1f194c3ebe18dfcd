use image::RgbaImage;

use crate::types::{Joint, Keypoint, PoseKeypointMap};

pub const CONNECTIONS: &[(Joint, Joint)] = &[
    (Joint::LeftEar, Joint::LeftEye),
    (Joint::LeftEye, Joint::Nose),
    (Joint::Nose, Joint::RightEye),
    (Joint::RightEye, Joint::RightEar),
    (Joint::Nose, Joint::Neck),
    (Joint::Neck, Joint::LeftShoulder),
    (Joint::Neck, Joint::RightShoulder),
    (Joint::LeftShoulder, Joint::LeftElbow),
    (Joint::LeftElbow, Joint::LeftWrist),
    (Joint::RightShoulder, Joint::RightElbow),
    (Joint::RightElbow, Joint::RightWrist),
    (Joint::Neck, Joint::Root),
    (Joint::Root, Joint::LeftHip),
    (Joint::Root, Joint::RightHip),
    (Joint::LeftHip, Joint::LeftKnee),
    (Joint::LeftKnee, Joint::LeftAnkle),
    (Joint::RightHip, Joint::RightKnee),
    (Joint::RightKnee, Joint::RightAnkle),
];

pub const SKELETON_LINE_THICKNESS: i32 = 4;
pub const BASE_POINT_RADIUS: f32 = 8.0;
const RING_THICKNESS: i32 = 3;

#[derive(Clone, Debug)]
pub struct SkeletonStyle {
    pub line_color: [u8; 4],
    pub point_color: [u8; 4],
    pub line_thickness: i32,
    pub base_radius: f32,
    /// Joints that get an extra ring in `highlight_color`.
    pub highlighted: Vec<Joint>,
    pub highlight_color: [u8; 4],
    pub highlight_radius: i32,
}

impl Default for SkeletonStyle {
    fn default() -> Self {
        Self {
            line_color: [56, 189, 248, 255],
            point_color: [248, 113, 113, 255],
            line_thickness: SKELETON_LINE_THICKNESS,
            base_radius: BASE_POINT_RADIUS,
            highlighted: Vec::new(),
            highlight_color: [250, 204, 21, 255],
            highlight_radius: BASE_POINT_RADIUS as i32 + 6,
        }
    }
}

impl SkeletonStyle {
    /// Rings the joints the arm-raising rules look at.
    pub fn highlight_hands() -> Self {
        Self {
            highlighted: vec![Joint::LeftWrist, Joint::RightWrist, Joint::Nose],
            ..Self::default()
        }
    }
}

/// Maps a normalized bottom-left-origin point to top-left pixel space.
pub fn to_pixel(keypoint: &Keypoint, width: u32, height: u32) -> (f32, f32) {
    (
        keypoint.x * width as f32,
        (1.0 - keypoint.y) * height as f32,
    )
}

/// Radius of a joint marker; grows with detector confidence.
pub fn point_radius(base_radius: f32, confidence: f32) -> f32 {
    base_radius * (0.5 + 0.5 * confidence)
}

pub fn draw_skeleton(
    canvas: &mut RgbaImage,
    keypoints: &PoseKeypointMap,
    threshold: f32,
    style: &SkeletonStyle,
) {
    draw_skeleton_with_alpha(canvas, keypoints, threshold, style, 1.0);
}

/// Same as [`draw_skeleton`] but blends every stroke with `alpha` in `[0, 1]`.
pub fn draw_skeleton_with_alpha(
    canvas: &mut RgbaImage,
    keypoints: &PoseKeypointMap,
    threshold: f32,
    style: &SkeletonStyle,
    alpha: f32,
) {
    let alpha = alpha.clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }
    let (width, height) = canvas.dimensions();

    for &(a, b) in CONNECTIONS {
        if let (Some(pa), Some(pb)) = (
            keypoints.confident(a, threshold),
            keypoints.confident(b, threshold),
        ) {
            draw_line(
                canvas,
                &to_pixel(&pa, width, height),
                &to_pixel(&pb, width, height),
                style.line_color,
                style.line_thickness,
                alpha,
            );
        }
    }

    for (joint, kp) in keypoints.iter() {
        if !kp.is_confident(threshold) {
            continue;
        }
        let (x, y) = to_pixel(kp, width, height);
        let reach = style.highlight_radius.max(style.base_radius.ceil() as i32) as f32;
        if !within_margin(x, y, width, height, reach) {
            continue;
        }
        let center = (x as i32, y as i32);
        let radius = point_radius(style.base_radius, kp.confidence).round() as i32;
        draw_circle(canvas, center, radius, style.point_color, alpha);

        if style.highlighted.contains(&joint) {
            draw_ring(
                canvas,
                center,
                style.highlight_radius,
                RING_THICKNESS,
                style.highlight_color,
                alpha,
            );
        }
    }
}

fn draw_line(
    canvas: &mut RgbaImage,
    p0: &(f32, f32),
    p1: &(f32, f32),
    color: [u8; 4],
    thickness: i32,
    alpha: f32,
) {
    let (width, height) = canvas.dimensions();
    let margin = thickness.max(1) as f32;
    let Some((p0, p1)) = clip_segment(
        *p0,
        *p1,
        (-margin, -margin),
        (width as f32 + margin, height as f32 + margin),
    ) else {
        return;
    };
    let (mut x0, mut y0) = (p0.0 as i32, p0.1 as i32);
    let (x1, y1) = (p1.0 as i32, p1.1 as i32);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = (thickness.max(1) - 1) / 2;

    loop {
        blend_pixel_safe(canvas, x0, y0, color, alpha);
        if radius > 0 {
            for ox in -radius..=radius {
                for oy in -radius..=radius {
                    if ox == 0 && oy == 0 {
                        continue;
                    }
                    if ox.abs() + oy.abs() <= radius {
                        blend_pixel_safe(canvas, x0 + ox, y0 + oy, color, alpha);
                    }
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn within_margin(x: f32, y: f32, width: u32, height: u32, margin: f32) -> bool {
    x.is_finite()
        && y.is_finite()
        && x >= -margin
        && y >= -margin
        && x <= width as f32 + margin
        && y <= height as f32 + margin
}

/// Liang-Barsky clip of the segment `p0..p1` against the box `min..max`.
/// `None` when nothing of the segment lies inside.
fn clip_segment(
    p0: (f32, f32),
    p1: (f32, f32),
    min: (f32, f32),
    max: (f32, f32),
) -> Option<((f32, f32), (f32, f32))> {
    if !(p0.0.is_finite() && p0.1.is_finite() && p1.0.is_finite() && p1.1.is_finite()) {
        return None;
    }
    let (dx, dy) = (p1.0 - p0.0, p1.1 - p0.1);
    let (mut t0, mut t1) = (0.0_f32, 1.0_f32);
    let edges = [
        (-dx, p0.0 - min.0),
        (dx, max.0 - p0.0),
        (-dy, p0.1 - min.1),
        (dy, max.1 - p0.1),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((
        (p0.0 + t0 * dx, p0.1 + t0 * dy),
        (p0.0 + t1 * dx, p0.1 + t1 * dy),
    ))
}

fn draw_circle(canvas: &mut RgbaImage, center: (i32, i32), radius: i32, color: [u8; 4], alpha: f32) {
    let (cx, cy) = center;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                blend_pixel_safe(canvas, cx + dx, cy + dy, color, alpha);
            }
        }
    }
}

fn draw_ring(
    canvas: &mut RgbaImage,
    center: (i32, i32),
    radius: i32,
    thickness: i32,
    color: [u8; 4],
    alpha: f32,
) {
    let (cx, cy) = center;
    let inner = (radius - thickness).max(0);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let d2 = dx * dx + dy * dy;
            if d2 <= radius * radius && d2 > inner * inner {
                blend_pixel_safe(canvas, cx + dx, cy + dy, color, alpha);
            }
        }
    }
}

fn blend_pixel_safe(canvas: &mut RgbaImage, x: i32, y: i32, color: [u8; 4], alpha: f32) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= canvas.width() || uy >= canvas.height() {
        return;
    }
    let pixel = canvas.get_pixel_mut(ux, uy);
    if alpha >= 1.0 {
        pixel.0 = color;
        return;
    }
    let a = alpha * (color[3] as f32 / 255.0);
    for c in 0..3 {
        let blended = pixel.0[c] as f32 * (1.0 - a) + color[c] as f32 * a;
        pixel.0[c] = blended.round().clamp(0.0, 255.0) as u8;
    }
    pixel.0[3] = pixel.0[3].max((a * 255.0).round() as u8);
}
