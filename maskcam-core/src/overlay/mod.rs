//! overlay — accessory compositing
//!
//! Draws accessory images into the destination raster at the rectangles the
//! pose estimator computed: scale to fit the rect, rotate about the rect's
//! exact centre, source-over blend using the accessory's own alpha. Every
//! write is clamped to the destination bounds.

use anyhow::{Context, Result};
use fast_image_resize as fr;
use image::RgbaImage;
use std::path::Path;

use crate::pose::AccessoryRect;
use crate::video::RgbaFrame;

/// The two accessory images, loaded once before the pipeline accepts its
/// first frame. Missing assets are a hard initialisation error, never a
/// mid-stream surprise.
pub struct AccessoryKit {
    pub glasses: RgbaImage,
    pub cigarette: RgbaImage,
}

impl AccessoryKit {
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(glasses: P, cigarette: Q) -> Result<Self> {
        let glasses = image::open(glasses.as_ref())
            .with_context(|| format!("failed to load glasses image {}", glasses.as_ref().display()))?
            .into_rgba8();
        let cigarette = image::open(cigarette.as_ref())
            .with_context(|| {
                format!(
                    "failed to load cigarette image {}",
                    cigarette.as_ref().display()
                )
            })?
            .into_rgba8();
        Ok(Self { glasses, cigarette })
    }
}

/// Reusable compositing context to avoid per-frame allocations.
pub struct Compositor {
    resizer: fr::Resizer,
    scaled_buf: Vec<u8>,
}

impl Compositor {
    pub fn new() -> Self {
        Self {
            resizer: fr::Resizer::new(),
            scaled_buf: Vec::new(),
        }
    }

    /// Draw `accessory` into `dst` at `rect`, rotated by `rect.angle_degrees`
    /// about the rect centre. Degenerate rects draw nothing; off-raster
    /// portions are clipped.
    pub fn composite(
        &mut self,
        dst: &mut RgbaFrame,
        accessory: &RgbaImage,
        rect: &AccessoryRect,
    ) -> Result<()> {
        let rect_w = rect.width().round() as i64;
        let rect_h = rect.height().round() as i64;
        if rect_w < 1 || rect_h < 1 {
            return Ok(());
        }

        self.scale_accessory(accessory, rect_w as u32, rect_h as u32)?;

        if rect.angle_degrees == 0.0 {
            self.blit_axis_aligned(dst, rect, rect_w, rect_h);
        } else {
            self.blit_rotated(dst, rect, rect_w, rect_h);
        }
        Ok(())
    }

    /// Scale the accessory to the rect size into the scratch buffer.
    fn scale_accessory(&mut self, accessory: &RgbaImage, w: u32, h: u32) -> Result<()> {
        let src = fr::images::ImageRef::new(
            accessory.width(),
            accessory.height(),
            accessory.as_raw(),
            fr::PixelType::U8x4,
        )
        .context("failed to create accessory resize source")?;

        let out_len = (w * h * 4) as usize;
        if self.scaled_buf.len() != out_len {
            self.scaled_buf.resize(out_len, 0);
        }
        let mut dst = fr::images::Image::from_vec_u8(
            w,
            h,
            std::mem::take(&mut self.scaled_buf),
            fr::PixelType::U8x4,
        )
        .context("failed to create accessory resize destination")?;

        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
        self.resizer
            .resize(&src, &mut dst, Some(&options))
            .context("fast_image_resize accessory scale failed")?;

        self.scaled_buf = dst.into_vec();
        Ok(())
    }

    fn blit_axis_aligned(&self, dst: &mut RgbaFrame, rect: &AccessoryRect, w: i64, h: i64) {
        let x0 = rect.x1.round() as i64;
        let y0 = rect.y1.round() as i64;
        let dst_w = dst.width as i64;
        let dst_h = dst.height as i64;
        let src_stride = (w * 4) as usize;

        for row in 0..h {
            let dy = y0 + row;
            if dy < 0 || dy >= dst_h {
                continue;
            }
            for col in 0..w {
                let dx = x0 + col;
                if dx < 0 || dx >= dst_w {
                    continue;
                }
                let src_idx = row as usize * src_stride + col as usize * 4;
                let dst_idx = (dy * dst_w + dx) as usize * 4;
                blend_pixel(
                    &mut dst.data[dst_idx..dst_idx + 4],
                    &self.scaled_buf[src_idx..src_idx + 4],
                );
            }
        }
    }

    /// Inverse-mapped rotation: walk the rotated rect's bounding box in
    /// destination space and sample back into the scaled accessory.
    fn blit_rotated(&self, dst: &mut RgbaFrame, rect: &AccessoryRect, w: i64, h: i64) {
        let cx = rect.center_x();
        let cy = rect.center_y();
        let (sin, cos) = rect.angle_degrees.to_radians().sin_cos();

        let half_w = w as f32 / 2.0;
        let half_h = h as f32 / 2.0;
        let radius = half_w.hypot(half_h);

        let dst_w = dst.width as i64;
        let dst_h = dst.height as i64;
        let x_min = ((cx - radius).floor() as i64).max(0);
        let x_max = ((cx + radius).ceil() as i64).min(dst_w - 1);
        let y_min = ((cy - radius).floor() as i64).max(0);
        let y_max = ((cy + radius).ceil() as i64).min(dst_h - 1);

        let src_stride = (w * 4) as usize;

        for py in y_min..=y_max {
            for px in x_min..=x_max {
                let dx = px as f32 + 0.5 - cx;
                let dy = py as f32 + 0.5 - cy;
                // Rotate by -angle to land in the unrotated rect.
                let sx = cos * dx + sin * dy + half_w;
                let sy = -sin * dx + cos * dy + half_h;
                if sx < 0.0 || sy < 0.0 {
                    continue;
                }
                let (sxi, syi) = (sx as i64, sy as i64);
                if sxi >= w || syi >= h {
                    continue;
                }
                let src_idx = syi as usize * src_stride + sxi as usize * 4;
                let dst_idx = (py * dst_w + px) as usize * 4;
                blend_pixel(
                    &mut dst.data[dst_idx..dst_idx + 4],
                    &self.scaled_buf[src_idx..src_idx + 4],
                );
            }
        }
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

/// Source-over blend of one RGBA pixel using the source's alpha.
fn blend_pixel(dst: &mut [u8], src: &[u8]) {
    let alpha = src[3] as u32;
    match alpha {
        0 => {}
        255 => {
            dst[0] = src[0];
            dst[1] = src[1];
            dst[2] = src[2];
            dst[3] = 255;
        }
        _ => {
            let inv = 255 - alpha;
            for c in 0..3 {
                dst[c] = ((src[c] as u32 * alpha + dst[c] as u32 * inv + 127) / 255) as u8;
            }
            dst[3] = dst[3].max(src[3]);
        }
    }
}
