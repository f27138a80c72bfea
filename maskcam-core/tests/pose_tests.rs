//! Pose estimator tests: placement formulas, rotation sign convention,
//! determinism and degenerate-geometry handling.

use maskcam_core::detection::{indices, LandmarkSet, Point2, LANDMARK_COUNT};
use maskcam_core::pose::estimate;
use maskcam_core::transform::ResizeRatio;

const UNIT_RATIO: ResizeRatio = ResizeRatio {
    width: 1.0,
    height: 1.0,
};

/// The synthetic face used throughout: landmark coordinates chosen so every
/// placement quantity is easy to compute by hand.
fn synthetic_face() -> LandmarkSet {
    let mut points = [Point2::default(); LANDMARK_COUNT];
    points[indices::LEFT_EYEBROW] = Point2::new(100, 150);
    points[indices::LEFT_EYELID_TOP] = Point2::new(110, 160);
    points[indices::RIGHT_EYELID_TOP] = Point2::new(180, 158);
    points[indices::LEFT_EYE_OUTER] = Point2::new(95, 165);
    points[indices::RIGHT_EYE_OUTER] = Point2::new(195, 163);
    points[indices::NOSE_BRIDGE_TOP] = Point2::new(145, 170);
    points[indices::NOSE_BRIDGE_BOTTOM] = Point2::new(145, 200);
    points[indices::LEFT_MOUTH_CORNER] = Point2::new(130, 230);
    points[indices::RIGHT_MOUTH_CORNER] = Point2::new(160, 230);
    LandmarkSet::new(points)
}

/// A face where only the eyelid points matter, for angle-sign checks.
fn face_with_eyelids(left: Point2, right: Point2) -> LandmarkSet {
    let mut points = [Point2::default(); LANDMARK_COUNT];
    points[indices::LEFT_EYELID_TOP] = left;
    points[indices::RIGHT_EYELID_TOP] = right;
    // Keep the remaining reference landmarks at sane, non-degenerate spots.
    points[indices::LEFT_EYEBROW] = Point2::new(left.x - 10, left.y - 10);
    points[indices::LEFT_EYE_OUTER] = Point2::new(left.x - 15, left.y + 5);
    points[indices::RIGHT_EYE_OUTER] = Point2::new(right.x + 15, right.y + 5);
    points[indices::NOSE_BRIDGE_TOP] = Point2::new((left.x + right.x) / 2, left.y + 10);
    points[indices::NOSE_BRIDGE_BOTTOM] = Point2::new((left.x + right.x) / 2, left.y + 40);
    points[indices::LEFT_MOUTH_CORNER] = Point2::new(left.x, left.y + 70);
    points[indices::RIGHT_MOUTH_CORNER] = Point2::new(right.x, left.y + 70);
    LandmarkSet::new(points)
}

#[test]
fn glasses_placement_matches_hand_computed_values() {
    let pose = estimate(&synthetic_face(), UNIT_RATIO, 0).expect("pose");

    // eye-to-eyebrow margin = (160 - 150) / 2 = 5
    // top = 170 * 1.0 - 5 = 165
    assert_eq!(pose.glasses.y1, 165.0);
    // nose bridge length = |200 - 170| = 30, so bottom = 195
    assert_eq!(pose.glasses.y2, 195.0);
    // span expands outward past both eye corners by the margin
    assert!(pose.glasses.x1 < 95.0);
    assert!(pose.glasses.x2 > 195.0);
    assert_eq!(pose.glasses.x1, 90.0);
    assert_eq!(pose.glasses.x2, 200.0);
}

#[test]
fn margin_offset_shifts_the_top_edge() {
    let pose = estimate(&synthetic_face(), UNIT_RATIO, 40).expect("pose");
    // top = (170 + 40) * 1.0 - 5
    assert_eq!(pose.glasses.y1, 205.0);
}

#[test]
fn cigarette_is_a_mouth_width_square_left_of_the_mouth() {
    let pose = estimate(&synthetic_face(), UNIT_RATIO, 0).expect("pose");

    // mouth width = 160 - 130 = 30
    assert_eq!(pose.cigarette.x1, 100.0);
    assert_eq!(pose.cigarette.x2, 130.0);
    assert_eq!(pose.cigarette.y1, 230.0);
    assert_eq!(pose.cigarette.y2, 260.0);
    assert_eq!(pose.cigarette.angle_degrees, 0.0);
}

#[test]
fn independent_ratios_scale_each_axis() {
    let ratio = ResizeRatio {
        width: 2.0,
        height: 3.0,
    };
    let pose = estimate(&synthetic_face(), ratio, 0).expect("pose");

    // margin = (160 - 150) / 2 * 2.0 = 10
    // top = 170 * 3.0 - 10 = 500
    assert_eq!(pose.glasses.y1, 500.0);
    assert_eq!(pose.glasses.x1, 95.0 * 2.0 - 10.0);
    assert_eq!(pose.glasses.x2, 195.0 * 2.0 + 10.0);
}

#[test]
fn estimate_is_deterministic() {
    let face = synthetic_face();
    let first = estimate(&face, UNIT_RATIO, 0).expect("pose");
    let second = estimate(&face, UNIT_RATIO, 0).expect("pose");
    assert_eq!(first, second);
}

#[test]
fn angle_sign_follows_the_eye_line() {
    // Left lid lower than right (greater y) → negative tilt.
    let lower = estimate(
        &face_with_eyelids(Point2::new(110, 160), Point2::new(180, 158)),
        UNIT_RATIO,
        0,
    )
    .expect("pose");
    assert!(lower.glasses.angle_degrees < 0.0);

    // Left lid higher than right → positive tilt.
    let higher = estimate(
        &face_with_eyelids(Point2::new(110, 156), Point2::new(180, 158)),
        UNIT_RATIO,
        0,
    )
    .expect("pose");
    assert!(higher.glasses.angle_degrees > 0.0);

    // Level eye line → zero tilt.
    let level = estimate(
        &face_with_eyelids(Point2::new(110, 158), Point2::new(180, 158)),
        UNIT_RATIO,
        0,
    )
    .expect("pose");
    assert_eq!(level.glasses.angle_degrees, 0.0);
}

#[test]
fn angle_magnitude_is_arctangent_of_the_eyelid_slope() {
    let pose = estimate(&synthetic_face(), UNIT_RATIO, 0).expect("pose");
    // dy = |160 - 158| = 2, dx = 180 - 110 = 70
    let expected = (2.0f32 / 70.0).atan().to_degrees();
    assert!((pose.glasses.angle_degrees.abs() - expected).abs() < 1e-5);
}

#[test]
fn degenerate_eyelid_span_skips_the_face() {
    let face = face_with_eyelids(Point2::new(140, 150), Point2::new(140, 170));
    assert!(estimate(&face, UNIT_RATIO, 0).is_none());
}
