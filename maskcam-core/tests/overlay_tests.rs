//! Compositor tests: alpha blending, clipping, rotation and the exporter's
//! packing contract.

use image::{Rgba, RgbaImage};
use maskcam_core::export::{pack_rgba, FileSink, PixelFormat, VideoSink};
use maskcam_core::overlay::Compositor;
use maskcam_core::pose::AccessoryRect;
use maskcam_core::video::RgbaFrame;

fn black_frame(w: u32, h: u32) -> RgbaFrame {
    let mut frame = RgbaFrame::new(w, h);
    for px in frame.data.chunks_exact_mut(4) {
        px[3] = 255;
    }
    frame
}

fn solid_accessory(rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(2, 2, Rgba(rgba))
}

fn pixel(frame: &RgbaFrame, x: u32, y: u32) -> [u8; 4] {
    let idx = ((y * frame.width + x) * 4) as usize;
    frame.data[idx..idx + 4].try_into().unwrap()
}

fn rect(x1: f32, y1: f32, x2: f32, y2: f32, angle: f32) -> AccessoryRect {
    AccessoryRect {
        x1,
        y1,
        x2,
        y2,
        angle_degrees: angle,
    }
}

#[test]
fn opaque_accessory_fills_the_rect() {
    let mut frame = black_frame(10, 10);
    let accessory = solid_accessory([255, 0, 0, 255]);

    Compositor::new()
        .composite(&mut frame, &accessory, &rect(2.0, 2.0, 6.0, 6.0, 0.0))
        .unwrap();

    assert_eq!(pixel(&frame, 3, 3), [255, 0, 0, 255]);
    assert_eq!(pixel(&frame, 2, 2), [255, 0, 0, 255]);
    // Outside the rect stays black.
    assert_eq!(pixel(&frame, 7, 7), [0, 0, 0, 255]);
    assert_eq!(pixel(&frame, 0, 0), [0, 0, 0, 255]);
}

#[test]
fn transparent_accessory_leaves_the_frame_untouched() {
    let mut frame = black_frame(10, 10);
    let before = frame.data.clone();
    let accessory = solid_accessory([255, 255, 255, 0]);

    Compositor::new()
        .composite(&mut frame, &accessory, &rect(2.0, 2.0, 8.0, 8.0, 0.0))
        .unwrap();

    assert_eq!(frame.data, before);
}

#[test]
fn half_alpha_blends_toward_the_source() {
    let mut frame = black_frame(10, 10);
    let accessory = solid_accessory([200, 100, 0, 128]);

    Compositor::new()
        .composite(&mut frame, &accessory, &rect(0.0, 0.0, 4.0, 4.0, 0.0))
        .unwrap();

    let px = pixel(&frame, 1, 1);
    // over black: channel ≈ src * 128/255
    assert!((px[0] as i32 - 100).abs() <= 2, "got {px:?}");
    assert!((px[1] as i32 - 50).abs() <= 2, "got {px:?}");
    assert_eq!(px[2], 0);
}

#[test]
fn off_frame_rect_is_clipped_not_panicked() {
    let mut frame = black_frame(8, 8);
    let accessory = solid_accessory([0, 0, 255, 255]);
    let mut compositor = Compositor::new();

    // Hangs off every edge in turn.
    for r in [
        rect(-4.0, -4.0, 4.0, 4.0, 0.0),
        rect(4.0, 4.0, 12.0, 12.0, 0.0),
        rect(-20.0, -20.0, -10.0, -10.0, 0.0),
        rect(-4.0, -4.0, 4.0, 4.0, 33.0),
    ] {
        compositor.composite(&mut frame, &accessory, &r).unwrap();
    }

    // In-frame corner covered by the first rect got painted.
    assert_eq!(pixel(&frame, 0, 0), [0, 0, 255, 255]);
}

#[test]
fn degenerate_rect_draws_nothing() {
    let mut frame = black_frame(8, 8);
    let before = frame.data.clone();
    let accessory = solid_accessory([255, 0, 0, 255]);

    Compositor::new()
        .composite(&mut frame, &accessory, &rect(3.0, 3.0, 3.0, 3.0, 15.0))
        .unwrap();

    assert_eq!(frame.data, before);
}

#[test]
fn rotation_pivots_on_the_rect_center() {
    let mut frame = black_frame(20, 20);
    let accessory = solid_accessory([255, 0, 0, 255]);

    // A wide flat rect rotated 90° becomes tall: the centre is painted
    // either way, but the far-left of the unrotated rect is not.
    Compositor::new()
        .composite(&mut frame, &accessory, &rect(2.0, 8.0, 18.0, 12.0, 90.0))
        .unwrap();

    assert_eq!(pixel(&frame, 10, 10), [255, 0, 0, 255]);
    // Above/below centre inside the rotated footprint.
    assert_eq!(pixel(&frame, 10, 4), [255, 0, 0, 255]);
    assert_eq!(pixel(&frame, 10, 16), [255, 0, 0, 255]);
    // Original horizontal extremes are outside the rotated footprint.
    assert_eq!(pixel(&frame, 3, 10), [0, 0, 0, 255]);
    assert_eq!(pixel(&frame, 17, 10), [0, 0, 0, 255]);
}

#[test]
fn pack_rgba_is_tight_and_fresh() {
    let mut frame = RgbaFrame::new(6, 3);
    frame.data[0] = 42;

    let packed = pack_rgba(&frame);
    assert_eq!(packed.len(), 6 * 3 * 4);
    assert_eq!(packed[0], 42);

    // Fresh allocation: mutating the packed buffer leaves the frame alone.
    let mut packed = packed;
    packed[0] = 0;
    assert_eq!(frame.data[0], 42);
}

#[test]
fn file_sink_accepts_frames() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frames.rgba");

    let frame = RgbaFrame::new(4, 4);
    let mut sink = FileSink::create(&path).unwrap();
    let packed = pack_rgba(&frame);
    sink.consume(&packed, PixelFormat::Rgba, 4, 4, 123).unwrap();
    sink.consume(&packed, PixelFormat::Rgba, 4, 4, 456).unwrap();
    assert_eq!(sink.frames_written(), 2);
    drop(sink);

    let written = std::fs::read(&path).unwrap();
    assert_eq!(written.len(), 2 * 4 * 4 * 4);
}

#[test]
fn pixel_format_wire_tag_is_stable() {
    assert_eq!(PixelFormat::Rgba.wire_tag(), 4);
}
