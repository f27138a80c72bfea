//! detection — 68-point facial landmark capability
//!
//! The pipeline treats landmark detection as an opaque capability: given a
//! fixed-size square RGBA raster, produce zero or more 68-point landmark
//! sets. [`LandmarkDetector`] is that seam; [`OnnxLandmarkDetector`] is the
//! bundled ONNX-backed implementation. Any backend with the same anatomical
//! indexing can be substituted without touching the rest of the pipeline.

use anyhow::{bail, Context, Result};
use image::Rgba;
use ort::session::Session;
use ort::value::Tensor;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::transform::{self, Affine};
use crate::video::RgbaFrame;

/// Number of points in the anatomical landmark scheme.
pub const LANDMARK_COUNT: usize = 68;
/// Side length of the square detector input raster.
pub const DETECTOR_INPUT_SIZE: u32 = 224;

/// Fixed anatomical indices within a 68-point landmark set.
pub mod indices {
    /// Left eyebrow, above the left eye.
    pub const LEFT_EYEBROW: usize = 20;
    /// Top of the nose bridge, between the eyes.
    pub const NOSE_BRIDGE_TOP: usize = 27;
    /// Bottom of the nose bridge.
    pub const NOSE_BRIDGE_BOTTOM: usize = 30;
    /// Outer corner of the left eye.
    pub const LEFT_EYE_OUTER: usize = 36;
    /// Top of the left upper eyelid.
    pub const LEFT_EYELID_TOP: usize = 38;
    /// Top of the right upper eyelid.
    pub const RIGHT_EYELID_TOP: usize = 43;
    /// Outer corner of the right eye.
    pub const RIGHT_EYE_OUTER: usize = 45;
    /// Right corner of the mouth.
    pub const RIGHT_MOUTH_CORNER: usize = 64;
    /// Left corner of the mouth.
    pub const LEFT_MOUTH_CORNER: usize = 67;
}

/// A 2D integer point in detector-input space.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Point2 {
    pub x: i32,
    pub y: i32,
}

impl Point2 {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(self, other: Point2) -> f32 {
        let dx = (other.x - self.x) as f32;
        let dy = (other.y - self.y) as f32;
        dx.hypot(dy)
    }
}

/// An ordered, fixed-length set of landmark points for one detected face.
/// Read-only after creation; frame-scoped.
#[derive(Debug, Clone)]
pub struct LandmarkSet {
    points: [Point2; LANDMARK_COUNT],
}

impl LandmarkSet {
    pub fn new(points: [Point2; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    pub fn from_slice(points: &[Point2]) -> Result<Self> {
        let points: [Point2; LANDMARK_COUNT] = points
            .try_into()
            .map_err(|_| anyhow::anyhow!("expected {LANDMARK_COUNT} landmarks, got {}", points.len()))?;
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point2; LANDMARK_COUNT] {
        &self.points
    }

    pub fn left_eyebrow(&self) -> Point2 {
        self.points[indices::LEFT_EYEBROW]
    }
    pub fn nose_bridge_top(&self) -> Point2 {
        self.points[indices::NOSE_BRIDGE_TOP]
    }
    pub fn nose_bridge_bottom(&self) -> Point2 {
        self.points[indices::NOSE_BRIDGE_BOTTOM]
    }
    pub fn left_eye_outer(&self) -> Point2 {
        self.points[indices::LEFT_EYE_OUTER]
    }
    pub fn left_eyelid_top(&self) -> Point2 {
        self.points[indices::LEFT_EYELID_TOP]
    }
    pub fn right_eyelid_top(&self) -> Point2 {
        self.points[indices::RIGHT_EYELID_TOP]
    }
    pub fn right_eye_outer(&self) -> Point2 {
        self.points[indices::RIGHT_EYE_OUTER]
    }
    pub fn left_mouth_corner(&self) -> Point2 {
        self.points[indices::LEFT_MOUTH_CORNER]
    }
    pub fn right_mouth_corner(&self) -> Point2 {
        self.points[indices::RIGHT_MOUTH_CORNER]
    }
}

/// Opaque landmark-detection capability.
///
/// Implementations are initialised once (construction) and released exactly
/// once (drop). `detect` may return an empty vector; that is the normal
/// "no face in frame" case, not an error.
pub trait LandmarkDetector {
    fn detect(&mut self, frame: &RgbaFrame) -> Result<Vec<LandmarkSet>>;
}

// ── ONNX backend ─────────────────────────────────────────────────────────────

/// ONNX-backed landmark regressor: NCHW 1×3×224×224 input normalised to
/// [0, 1], flat 136-float output of normalised (x, y) pairs.
pub struct OnnxLandmarkDetector {
    session: Session,
}

impl OnnxLandmarkDetector {
    /// Load the landmark model from `model_path`.
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let session =
            build_ort_session(model_path.as_ref(), "failed to load landmark ONNX model")?;
        Ok(Self { session })
    }

    fn preprocess(&self, frame: &RgbaFrame) -> Result<ort::value::DynValue> {
        // NCHW float tensor: [1, 3, 224, 224].
        let size = (DETECTOR_INPUT_SIZE * DETECTOR_INPUT_SIZE) as usize;
        let mut tensor_data = vec![0f32; 3 * size];
        let raw = &frame.data;

        let (r_plane, gb_plane) = tensor_data.split_at_mut(size);
        let (g_plane, b_plane) = gb_plane.split_at_mut(size);
        rayon::join(
            || {
                r_plane
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(idx, out)| *out = raw[idx * 4] as f32 / 255.0)
            },
            || {
                rayon::join(
                    || {
                        g_plane
                            .par_iter_mut()
                            .enumerate()
                            .for_each(|(idx, out)| *out = raw[idx * 4 + 1] as f32 / 255.0)
                    },
                    || {
                        b_plane
                            .par_iter_mut()
                            .enumerate()
                            .for_each(|(idx, out)| *out = raw[idx * 4 + 2] as f32 / 255.0)
                    },
                )
            },
        );

        let shape = [
            1usize,
            3,
            DETECTOR_INPUT_SIZE as usize,
            DETECTOR_INPUT_SIZE as usize,
        ];
        Ok(Tensor::from_array((shape, tensor_data.into_boxed_slice()))
            .context("failed to create landmark input tensor")?
            .into_dyn())
    }
}

impl LandmarkDetector for OnnxLandmarkDetector {
    fn detect(&mut self, frame: &RgbaFrame) -> Result<Vec<LandmarkSet>> {
        if frame.width != DETECTOR_INPUT_SIZE || frame.height != DETECTOR_INPUT_SIZE {
            bail!(
                "detector input must be {DETECTOR_INPUT_SIZE}x{DETECTOR_INPUT_SIZE}, got {}x{}",
                frame.width,
                frame.height
            );
        }

        let input_tensor = self.preprocess(frame)?;
        let outputs = self
            .session
            .run(ort::inputs!["input" => input_tensor])
            .context("landmark inference failed")?;

        // The model regresses one landmark set over the whole input raster;
        // first output is the flat coordinate vector.
        let first_value = outputs
            .iter()
            .next()
            .context("landmark model produced no outputs")?
            .1;
        let (_shape, data) = first_value
            .try_extract_tensor::<f32>()
            .context("failed to extract landmark output tensor")?;

        if data.len() < LANDMARK_COUNT * 2 {
            bail!(
                "landmark output has {} values, expected {}",
                data.len(),
                LANDMARK_COUNT * 2
            );
        }

        let mut points = [Point2::default(); LANDMARK_COUNT];
        for (i, point) in points.iter_mut().enumerate() {
            point.x = (data[i * 2] * DETECTOR_INPUT_SIZE as f32).round() as i32;
            point.y = (data[i * 2 + 1] * DETECTOR_INPUT_SIZE as f32).round() as i32;
        }

        debug!("landmark set regressed");
        Ok(vec![LandmarkSet::new(points)])
    }
}

fn build_ort_session(model_path: &Path, load_error: &'static str) -> Result<Session> {
    let mut builder = Session::builder().context("failed to create ORT session builder")?;
    builder = builder
        .with_intra_threads(1)
        .context("failed to set ORT intra threads")?;
    builder = builder
        .with_inter_threads(1)
        .context("failed to set ORT inter threads")?;
    builder = builder
        .with_parallel_execution(false)
        .context("failed to set ORT parallel execution")?;
    builder.commit_from_file(model_path).context(load_error)
}

// ── Model asset install ──────────────────────────────────────────────────────

/// Copy the bundled model file into `data_dir`, returning the installed path.
/// Idempotent: an existing destination file is kept as-is.
pub fn install_model_file<P: AsRef<Path>, Q: AsRef<Path>>(
    bundled: P,
    data_dir: Q,
) -> Result<PathBuf> {
    let bundled = bundled.as_ref();
    let data_dir = data_dir.as_ref();

    let file_name = bundled
        .file_name()
        .context("bundled model path has no file name")?;
    let dest = data_dir.join(file_name);

    if dest.is_file() {
        debug!(path = %dest.display(), "model already installed");
        return Ok(dest);
    }

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create model directory {}", data_dir.display()))?;
    std::fs::copy(bundled, &dest).with_context(|| {
        format!(
            "failed to install model {} -> {}",
            bundled.display(),
            dest.display()
        )
    })?;
    info!(path = %dest.display(), "installed bundled model");
    Ok(dest)
}

// ── Debug rendering ──────────────────────────────────────────────────────────

/// Draw landmark points onto a frame in-place (for debug output), mapping
/// them from detector space into frame space through `to_frame`.
pub fn draw_landmarks(
    frame: &mut RgbaFrame,
    landmarks: &LandmarkSet,
    to_frame: &Affine,
    color: [u8; 4],
) -> Result<()> {
    let pts = frame.pts;
    // Build the image from the existing buffer — no clone; we write back in-place.
    let mut img = transform::into_image(std::mem::replace(frame, RgbaFrame::new(1, 1)))?;

    for point in landmarks.points() {
        let (x, y) = to_frame.apply(point.x as f32, point.y as f32);
        imageproc::drawing::draw_filled_circle_mut(
            &mut img,
            (x.round() as i32, y.round() as i32),
            2,
            Rgba(color),
        );
    }

    *frame = transform::from_image(img, pts);
    Ok(())
}
