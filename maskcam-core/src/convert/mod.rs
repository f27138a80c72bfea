//! convert — raw camera sample → RGBA raster
//!
//! Camera subsystems deliver planar or semi-planar 8-bit YUV with arbitrary
//! row padding and chroma pixel strides. This module turns one such sample
//! into a tightly packed RGBA frame. All indexing is computed from the
//! declared strides and checked against the declared plane lengths up front,
//! so a malformed sample fails the frame instead of reading out of range.

use anyhow::{bail, Result};

use crate::video::RgbaFrame;

/// One image plane of a raw camera sample.
///
/// `row_stride` is the byte distance between vertically adjacent samples;
/// `pixel_stride` the distance between horizontally adjacent ones
/// (2 for interleaved semi-planar chroma, 1 for fully planar data).
#[derive(Clone, Copy)]
pub struct PlaneView<'a> {
    pub data: &'a [u8],
    pub row_stride: usize,
    pub pixel_stride: usize,
}

/// A raw luma+chroma camera sample with 2x2-subsampled chroma, plus the
/// capture timestamp carried alongside it.
#[derive(Clone, Copy)]
pub struct YuvSample<'a> {
    pub width: u32,
    pub height: u32,
    pub y: PlaneView<'a>,
    pub u: PlaneView<'a>,
    pub v: PlaneView<'a>,
    pub pts: i64,
}

impl PlaneView<'_> {
    /// Largest byte index a `cols × rows` read pattern would touch.
    fn max_index(&self, cols: usize, rows: usize) -> usize {
        (rows - 1) * self.row_stride + (cols - 1) * self.pixel_stride
    }
}

/// Convert a YUV sample to an interleaved RGBA raster of the same dimensions.
///
/// Full-range BT.601 coefficients. Pure: the sample is only read, the output
/// is freshly allocated.
pub fn yuv_to_rgba(sample: &YuvSample) -> Result<RgbaFrame> {
    let w = sample.width as usize;
    let h = sample.height as usize;
    if w == 0 || h == 0 {
        bail!("sample dimensions must be non-zero, got {w}x{h}");
    }

    // Chroma planes cover the image at half resolution, rounded up.
    let cw = w.div_ceil(2);
    let ch = h.div_ceil(2);

    if sample.y.max_index(w, h) >= sample.y.data.len() {
        bail!(
            "luma plane too small: {} bytes for {w}x{h} at row stride {}",
            sample.y.data.len(),
            sample.y.row_stride
        );
    }
    for (name, plane) in [("u", &sample.u), ("v", &sample.v)] {
        if plane.max_index(cw, ch) >= plane.data.len() {
            bail!(
                "{name} chroma plane too small: {} bytes for {cw}x{ch} at row stride {}",
                plane.data.len(),
                plane.row_stride
            );
        }
    }

    let mut out = vec![0u8; w * h * 4];
    for row in 0..h {
        let y_base = row * sample.y.row_stride;
        let u_base = (row / 2) * sample.u.row_stride;
        let v_base = (row / 2) * sample.v.row_stride;
        for col in 0..w {
            let luma = sample.y.data[y_base + col * sample.y.pixel_stride] as f32;
            let cb = sample.u.data[u_base + (col / 2) * sample.u.pixel_stride] as f32 - 128.0;
            let cr = sample.v.data[v_base + (col / 2) * sample.v.pixel_stride] as f32 - 128.0;

            let r = luma + 1.402 * cr;
            let g = luma - 0.344_136 * cb - 0.714_136 * cr;
            let b = luma + 1.772 * cb;

            let px = (row * w + col) * 4;
            out[px] = r.clamp(0.0, 255.0) as u8;
            out[px + 1] = g.clamp(0.0, 255.0) as u8;
            out[px + 2] = b.clamp(0.0, 255.0) as u8;
            out[px + 3] = 255;
        }
    }

    RgbaFrame::from_raw(sample.width, sample.height, out, sample.pts)
}
