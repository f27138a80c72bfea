//! transform — geometric raster operations
//!
//! Pure functions for orientation correction, centre-square cropping to the
//! detector input size, and cover-fit scaling, plus the affine bookkeeping
//! needed to map detector-space coordinates back into full-resolution space.
//! Every operation allocates a fresh output raster and leaves its input
//! untouched.

use anyhow::{Context, Result};
use fast_image_resize as fr;
use image::{imageops, RgbaImage};
use nalgebra::{Matrix3, Vector3};

use crate::video::RgbaFrame;

// ── Orientation ──────────────────────────────────────────────────────────────

/// The eight canonical raster orientations, in EXIF tag order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl Orientation {
    /// Deterministic mapping from capture metadata to an orientation — the
    /// same mapping EXIF orientation tags use. Rotations outside the four
    /// quadrants are treated as upright.
    pub fn from_capture(rotation_degrees: i32, mirrored: bool) -> Self {
        match (rotation_degrees.rem_euclid(360), mirrored) {
            (0, false) => Self::Normal,
            (0, true) => Self::FlipHorizontal,
            (90, false) => Self::Rotate90,
            (90, true) => Self::Transpose,
            (180, false) => Self::Rotate180,
            (180, true) => Self::FlipVertical,
            (270, false) => Self::Rotate270,
            (270, true) => Self::Transverse,
            _ => Self::Normal,
        }
    }

    /// The orientation that undoes this one. Flips and diagonal transposes
    /// are their own inverse; only the quarter-turns swap.
    pub fn inverse(self) -> Self {
        match self {
            Self::Rotate90 => Self::Rotate270,
            Self::Rotate270 => Self::Rotate90,
            other => other,
        }
    }

    /// Whether applying this orientation swaps raster width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }
}

/// Apply the orientation implied by per-sample capture metadata.
pub fn orientation_correct(
    frame: RgbaFrame,
    rotation_degrees: i32,
    mirrored: bool,
) -> Result<RgbaFrame> {
    apply_orientation(frame, Orientation::from_capture(rotation_degrees, mirrored))
}

/// Apply one of the eight canonical orientations, consuming the input frame.
pub fn apply_orientation(frame: RgbaFrame, orientation: Orientation) -> Result<RgbaFrame> {
    if orientation == Orientation::Normal {
        return Ok(frame);
    }

    let pts = frame.pts;
    let img = into_image(frame)?;
    let out = match orientation {
        Orientation::Normal => img,
        Orientation::FlipHorizontal => imageops::flip_horizontal(&img),
        Orientation::Rotate180 => imageops::rotate180(&img),
        Orientation::FlipVertical => imageops::flip_vertical(&img),
        // Transpose mirrors across the main diagonal, transverse across the
        // anti-diagonal; both decompose into a quarter-turn plus a flip.
        Orientation::Transpose => imageops::flip_horizontal(&imageops::rotate90(&img)),
        Orientation::Rotate90 => imageops::rotate90(&img),
        Orientation::Transverse => imageops::flip_vertical(&imageops::rotate90(&img)),
        Orientation::Rotate270 => imageops::rotate270(&img),
    };
    Ok(from_image(out, pts))
}

/// Reinterpret a frame as an `image` buffer without copying.
pub(crate) fn into_image(frame: RgbaFrame) -> Result<RgbaImage> {
    let (w, h) = (frame.width, frame.height);
    RgbaImage::from_raw(w, h, frame.data).context("frame buffer does not match its dimensions")
}

/// The reverse of [`into_image`], re-attaching the presentation timestamp.
pub(crate) fn from_image(img: RgbaImage, pts: i64) -> RgbaFrame {
    let (width, height) = img.dimensions();
    RgbaFrame {
        data: img.into_raw(),
        width,
        height,
        pts,
    }
}

// ── Crop / scale ─────────────────────────────────────────────────────────────

/// Crop the largest centred square out of `frame` and scale it to
/// `dst_size × dst_size` — the fixed-size input the landmark detector expects.
///
/// Returns the output raster together with the source→output affine mapping.
pub fn center_crop_square_scale(frame: &RgbaFrame, dst_size: u32) -> Result<(RgbaFrame, Affine)> {
    let min_dim = frame.width.min(frame.height);
    let off_x = (frame.width - min_dim) / 2;
    let off_y = (frame.height - min_dim) / 2;

    let square = crop_rows(frame, off_x, off_y, min_dim, min_dim);
    let scaled = resize_rgba(&square, min_dim, min_dim, dst_size, dst_size)?;

    let scale = dst_size as f32 / min_dim as f32;
    let mapping = Affine::translation(-(off_x as f32), -(off_y as f32))
        .then(Affine::scale(scale, scale));

    Ok((
        RgbaFrame::from_raw(dst_size, dst_size, scaled, frame.pts)?,
        mapping,
    ))
}

/// Scale `frame` so it covers a `dst_width × dst_height` rectangle, centre it
/// and crop the overflow — the inverse-direction operation used to map a full
/// camera frame into the raster shown on screen.
pub fn fit_scale(frame: &RgbaFrame, dst_width: u32, dst_height: u32) -> Result<(RgbaFrame, Affine)> {
    let scale = (dst_width as f32 / frame.width as f32)
        .max(dst_height as f32 / frame.height as f32);
    let scaled_w = ((frame.width as f32 * scale).round() as u32).max(dst_width);
    let scaled_h = ((frame.height as f32 * scale).round() as u32).max(dst_height);

    let scaled = resize_rgba(&frame.data, frame.width, frame.height, scaled_w, scaled_h)?;
    let scaled_frame = RgbaFrame::from_raw(scaled_w, scaled_h, scaled, frame.pts)?;

    let off_x = (scaled_w - dst_width) / 2;
    let off_y = (scaled_h - dst_height) / 2;
    let cropped = crop_rows(&scaled_frame, off_x, off_y, dst_width, dst_height);

    let mapping = Affine::scale(scale, scale)
        .then(Affine::translation(-(off_x as f32), -(off_y as f32)));

    Ok((
        RgbaFrame::from_raw(dst_width, dst_height, cropped, frame.pts)?,
        mapping,
    ))
}

/// Copy a sub-rectangle out of a frame, row by row.
fn crop_rows(frame: &RgbaFrame, off_x: u32, off_y: u32, w: u32, h: u32) -> Vec<u8> {
    let src_stride = (frame.width * 4) as usize;
    let dst_stride = (w * 4) as usize;
    let mut out = vec![0u8; dst_stride * h as usize];
    for row in 0..h as usize {
        let src_start = (off_y as usize + row) * src_stride + off_x as usize * 4;
        let dst_start = row * dst_stride;
        out[dst_start..dst_start + dst_stride]
            .copy_from_slice(&frame.data[src_start..src_start + dst_stride]);
    }
    out
}

/// SIMD-accelerated RGBA resize via fast_image_resize.
fn resize_rgba(data: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Result<Vec<u8>> {
    let src = fr::images::ImageRef::new(src_w, src_h, data, fr::PixelType::U8x4)
        .context("failed to create resize source")?;

    let mut dst = fr::images::Image::from_vec_u8(
        dst_w,
        dst_h,
        vec![0u8; (dst_w * dst_h * 4) as usize],
        fr::PixelType::U8x4,
    )
    .context("failed to create resize destination")?;

    let options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
    fr::Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .context("fast_image_resize scale failed")?;

    Ok(dst.into_vec())
}

// ── Resize ratios ────────────────────────────────────────────────────────────

/// Scalar factors converting detector-input-space distances to
/// destination-raster-space distances. Width and height are independent:
/// the destination aspect ratio need not match the detector square.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ResizeRatio {
    pub width: f32,
    pub height: f32,
}

/// Caches the resize ratios for the current destination dimensions and
/// recomputes them only when those dimensions change.
#[derive(Debug, Default)]
pub struct RatioCache {
    src_size: u32,
    dst_w: u32,
    dst_h: u32,
    ratio: ResizeRatio,
}

impl RatioCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ratio of each destination dimension to the (square) detector input
    /// size. Repeated calls with unchanged dimensions return the cached,
    /// bit-identical scalars.
    pub fn get(&mut self, src_size: u32, dst_w: u32, dst_h: u32) -> ResizeRatio {
        if src_size != self.src_size || dst_w != self.dst_w || dst_h != self.dst_h {
            self.src_size = src_size;
            self.dst_w = dst_w;
            self.dst_h = dst_h;
            self.ratio = ResizeRatio {
                width: ratio(src_size, dst_w),
                height: ratio(src_size, dst_h),
            };
        }
        self.ratio
    }
}

/// `dst_dim / src_dim`.
pub fn ratio(src_dim: u32, dst_dim: u32) -> f32 {
    dst_dim as f32 / src_dim as f32
}

// ── Affine mapping ───────────────────────────────────────────────────────────

/// A 2D affine transform in homogeneous coordinates, composed of translate /
/// scale / rotate steps. Composition order is significant and fixed per
/// construction site; transforms used to map detector-space geometry back
/// into full-resolution space must be invertible.
#[derive(Debug, Clone, Copy)]
pub struct Affine {
    m: Matrix3<f32>,
}

impl Affine {
    pub fn identity() -> Self {
        Self {
            m: Matrix3::identity(),
        }
    }

    pub fn translation(tx: f32, ty: f32) -> Self {
        Self {
            m: Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0),
        }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            m: Matrix3::new(sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0),
        }
    }

    pub fn rotation_degrees(degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            m: Matrix3::new(cos, -sin, 0.0, sin, cos, 0.0, 0.0, 0.0, 1.0),
        }
    }

    /// `next` applied after `self`.
    pub fn then(self, next: Affine) -> Affine {
        Affine { m: next.m * self.m }
    }

    /// Map a point through the transform.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let v = self.m * Vector3::new(x, y, 1.0);
        (v.x, v.y)
    }

    /// The inverse mapping, if one exists.
    pub fn invert(&self) -> Option<Affine> {
        self.m.try_inverse().map(|m| Affine { m })
    }
}
