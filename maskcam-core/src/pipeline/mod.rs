//! pipeline — per-frame orchestration
//!
//! One camera sample in, one composited raster out: colour conversion,
//! orientation fix, centre-crop to the detector input, landmark detection,
//! pose estimation, accessory compositing. The pipeline owns all per-frame
//! scratch state; a missing or failing detector degrades to a pass-through
//! raster instead of failing the frame.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::convert::{self, YuvSample};
use crate::detection::{LandmarkDetector, LandmarkSet, DETECTOR_INPUT_SIZE};
use crate::overlay::{AccessoryKit, Compositor};
use crate::pose;
use crate::transform::{self, Affine, RatioCache};
use crate::video::RgbaFrame;

/// Landmark detections for one frame plus the detector→frame mapping.
pub struct FrameDetections {
    pub faces: Vec<LandmarkSet>,
    pub to_frame: Affine,
}

pub struct OverlayPipeline {
    detector: Option<Box<dyn LandmarkDetector + Send>>,
    accessories: AccessoryKit,
    compositor: Compositor,
    ratios: RatioCache,
    margin_offset: i32,
    display_size: Option<(u32, u32)>,
    prof_frames: u64,
    prof_detect: Duration,
    prof_compose: Duration,
}

impl OverlayPipeline {
    /// `detector: None` means "permanently unavailable": every frame passes
    /// through with zero faces. This is the recovery mode for a model that
    /// failed to load.
    pub fn new(
        detector: Option<Box<dyn LandmarkDetector + Send>>,
        accessories: AccessoryKit,
        margin_offset: i32,
    ) -> Self {
        Self {
            detector,
            accessories,
            compositor: Compositor::new(),
            ratios: RatioCache::new(),
            margin_offset,
            display_size: None,
            prof_frames: 0,
            prof_detect: Duration::ZERO,
            prof_compose: Duration::ZERO,
        }
    }

    /// Fit every oriented frame to a fixed destination raster size before
    /// detection and compositing (the shape of an on-screen surface).
    /// Without this, frames keep their capture dimensions.
    pub fn with_display_size(mut self, width: u32, height: u32) -> Self {
        self.display_size = Some((width, height));
        self
    }

    /// Full pipeline over one raw camera sample.
    pub fn process_sample(
        &mut self,
        sample: &YuvSample,
        rotation_degrees: i32,
        mirrored: bool,
    ) -> Result<RgbaFrame> {
        let frame = convert::yuv_to_rgba(sample)?;
        self.process_frame(frame, rotation_degrees, mirrored)
    }

    /// Full pipeline over an already-converted RGBA frame.
    pub fn process_frame(
        &mut self,
        frame: RgbaFrame,
        rotation_degrees: i32,
        mirrored: bool,
    ) -> Result<RgbaFrame> {
        let oriented = transform::orientation_correct(frame, rotation_degrees, mirrored)?;
        let mut dest = match self.display_size {
            Some((w, h)) if (w, h) != (oriented.width, oriented.height) => {
                transform::fit_scale(&oriented, w, h)?.0
            }
            _ => oriented,
        };

        let detect_start = Instant::now();
        let detections = self.detect_faces(&dest)?;
        self.prof_detect += detect_start.elapsed();

        let ratio = self
            .ratios
            .get(DETECTOR_INPUT_SIZE, dest.width, dest.height);

        let compose_start = Instant::now();
        for landmarks in &detections.faces {
            let Some(face) = pose::estimate(landmarks, ratio, self.margin_offset) else {
                tracing::debug!("degenerate landmark geometry; skipping face");
                continue;
            };
            self.compositor
                .composite(&mut dest, &self.accessories.glasses, &face.glasses)?;
            self.compositor
                .composite(&mut dest, &self.accessories.cigarette, &face.cigarette)?;
        }
        self.prof_compose += compose_start.elapsed();

        self.prof_frames += 1;
        if self.prof_frames > 0 && self.prof_frames % 300 == 0 {
            tracing::info!(
                frames = self.prof_frames,
                detect_ms_per_frame = format!(
                    "{:.2}",
                    self.prof_detect.as_secs_f64() * 1000.0 / self.prof_frames as f64
                ),
                compose_ms_per_frame = format!(
                    "{:.2}",
                    self.prof_compose.as_secs_f64() * 1000.0 / self.prof_frames as f64
                ),
                "pipeline timings"
            );
        }

        Ok(dest)
    }

    /// Run only the detection half of the pipeline against a destination
    /// raster: crop/scale to the detector input, detect, and return the
    /// faces plus the detector→frame affine.
    pub fn detect_faces(&mut self, frame: &RgbaFrame) -> Result<FrameDetections> {
        detect_in_frame(self.detector.as_deref_mut(), frame)
    }
}

/// Detection over one destination raster, usable with or without a full
/// pipeline. `None` means "detector unavailable" and yields zero faces —
/// never a frame failure. Detector errors are logged and also degrade to
/// zero faces.
pub fn detect_in_frame<'d>(
    detector: Option<&mut (dyn LandmarkDetector + Send + 'd)>,
    frame: &RgbaFrame,
) -> Result<FrameDetections> {
    let (detector_input, to_detector) =
        transform::center_crop_square_scale(frame, DETECTOR_INPUT_SIZE)?;
    let to_frame = to_detector
        .invert()
        .context("detector mapping is not invertible")?;

    let faces = match detector {
        Some(detector) => match detector.detect(&detector_input) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!("landmark detection error: {e:#}");
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    Ok(FrameDetections { faces, to_frame })
}
