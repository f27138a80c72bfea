//! pose — landmark set → accessory placement
//!
//! Derives the two accessory rectangles (eyewear, mouth accessory) and the
//! eyewear tilt angle from one face's landmarks. Landmarks live in
//! detector-input space; the resize ratios convert the geometry into
//! destination-raster space. Pure: same landmarks and ratios in, identical
//! placement out.

use crate::detection::LandmarkSet;
use crate::transform::ResizeRatio;

/// An axis-aligned rectangle plus a rotation angle (degrees, about the rect
/// centre) in destination-raster space. Consumed immediately by the
/// compositor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccessoryRect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub angle_degrees: f32,
}

impl AccessoryRect {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
    pub fn center_x(&self) -> f32 {
        (self.x1 + self.x2) / 2.0
    }
    pub fn center_y(&self) -> f32 {
        (self.y1 + self.y2) / 2.0
    }
}

/// Accessory placement for one detected face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacePose {
    pub glasses: AccessoryRect,
    pub cigarette: AccessoryRect,
}

/// Estimate accessory placement from one face's landmarks.
///
/// `margin_offset` is a vertical landmark-space offset compensating for any
/// gap between the raster shown and the raster analysed.
///
/// Returns `None` when the upper-eyelid span is degenerate (zero horizontal
/// distance): the tilt angle is undefined there, so the face is skipped
/// rather than propagating a division by zero.
pub fn estimate(
    landmarks: &LandmarkSet,
    ratio: ResizeRatio,
    margin_offset: i32,
) -> Option<FacePose> {
    let eyebrow = landmarks.left_eyebrow();
    let nose_top = landmarks.nose_bridge_top();
    let nose_bottom = landmarks.nose_bridge_bottom();
    let left_eye = landmarks.left_eye_outer();
    let left_lid = landmarks.left_eyelid_top();
    let right_lid = landmarks.right_eyelid_top();
    let right_eye = landmarks.right_eye_outer();
    let left_mouth = landmarks.left_mouth_corner();
    let right_mouth = landmarks.right_mouth_corner();

    let lid_span = (right_lid.x - left_lid.x) as f32;
    if lid_span == 0.0 {
        return None;
    }

    // Tilt follows the eye line: angle between the two upper eyelids,
    // negative when the left lid sits below the right one.
    let lid_drop = (left_lid.y - right_lid.y).abs() as f32;
    let mut angle = (lid_drop / lid_span).atan().to_degrees();
    if left_lid.y > right_lid.y {
        angle = -angle;
    }

    // Half the eyebrow-to-eyelid gap, used as margin on all glasses edges.
    let margin = (left_lid.y - eyebrow.y) as f32 / 2.0 * ratio.width;

    let top = (nose_top.y + margin_offset) as f32 * ratio.height - margin;
    let nose_length = nose_top.distance(nose_bottom) * ratio.width;

    let glasses = AccessoryRect {
        x1: left_eye.x as f32 * ratio.width - margin,
        y1: top,
        x2: right_eye.x as f32 * ratio.width + margin,
        y2: top + nose_length,
        angle_degrees: angle,
    };

    // Mouth accessory: a mouth-width square hanging off the left mouth
    // corner, always axis-aligned.
    let mouth_width = (right_mouth.x - left_mouth.x) as f32 * ratio.width;
    let mouth_x = left_mouth.x as f32 * ratio.width;
    let mouth_y = (left_mouth.y + margin_offset) as f32 * ratio.height;

    let cigarette = AccessoryRect {
        x1: mouth_x - mouth_width,
        y1: mouth_y,
        x2: mouth_x,
        y2: mouth_y + mouth_width,
        angle_degrees: 0.0,
    };

    Some(FacePose { glasses, cigarette })
}
