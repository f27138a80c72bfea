//! runtime — process-level plumbing
//!
//! ONNX Runtime dylib discovery, plus the two concurrency primitives the
//! frame producer/consumer contract needs: a gate serialising one frame in
//! flight per pipeline instance, and a relay handing finished frames to
//! display/export consumers as stable snapshots.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::video::RgbaFrame;

/// Resolve and set ORT_DYLIB_PATH at runtime when it is missing or invalid.
///
/// Priority order:
/// 1) Existing ORT_DYLIB_PATH (if file exists)
/// 2) models/onnxruntime*/lib/libonnxruntime.{so,dylib} near current exe/cwd
pub fn configure_ort_dylib() {
    if let Some(existing) = std::env::var_os("ORT_DYLIB_PATH") {
        let existing_path = PathBuf::from(existing);
        if existing_path.is_file() {
            tracing::info!(path = %existing_path.display(), "using ORT_DYLIB_PATH from environment");
            return;
        }
        tracing::warn!(
            path = %existing_path.display(),
            "ORT_DYLIB_PATH is set but file does not exist; attempting auto-discovery"
        );
    }

    for candidate in ort_candidates() {
        if candidate.is_file() {
            // SAFETY: this is called before any ORT sessions are created and
            // from the single startup thread, so no concurrent env mutation.
            unsafe {
                std::env::set_var("ORT_DYLIB_PATH", &candidate);
            }
            tracing::info!(path = %candidate.display(), "configured ORT_DYLIB_PATH");
            return;
        }
    }

    tracing::warn!(
        "could not locate the ONNX Runtime library; set ORT_DYLIB_PATH to an official build"
    );
}

fn ort_candidates() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }

    if let Ok(exe) = std::env::current_exe() {
        let mut dir = exe.parent().map(Path::to_path_buf);
        for _ in 0..7 {
            let Some(d) = dir else {
                break;
            };
            roots.push(d.clone());
            dir = d.parent().map(Path::to_path_buf);
        }
    }

    let mut candidates = Vec::new();
    for root in roots {
        for lib in ["libonnxruntime.so", "libonnxruntime.dylib"] {
            candidates.push(root.join("models/onnxruntime/lib").join(lib));
            candidates.push(root.join("models").join(lib));
        }
    }
    candidates
}

// ── Frame gate ───────────────────────────────────────────────────────────────

/// Serialises frame processing: at most one frame in flight per pipeline
/// instance. A producer that cannot acquire the gate drops its frame rather
/// than queueing — under load, dropping beats unbounded buffering.
#[derive(Default)]
pub struct FrameGate {
    busy: AtomicBool,
}

/// Held for the duration of one frame's pipeline pass.
pub struct FramePermit<'a> {
    gate: &'a FrameGate,
}

impl FrameGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate, or `None` if a frame is already being processed.
    pub fn try_acquire(&self) -> Option<FramePermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| FramePermit { gate: self })
    }
}

impl Drop for FramePermit<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

// ── Frame relay ──────────────────────────────────────────────────────────────

/// Single-writer snapshot hand-off between the pipeline and its consumers
/// (display surface, transport exporter). The producer publishes a finished
/// frame; consumers only ever see completed snapshots, never a raster the
/// producer is still mutating.
#[derive(Default)]
pub struct FrameRelay {
    slot: Mutex<Option<Arc<RgbaFrame>>>,
}

impl FrameRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a completed frame, replacing any previous snapshot. A slow
    /// consumer simply misses the overwritten frame.
    pub fn publish(&self, frame: RgbaFrame) {
        let snapshot = Arc::new(frame);
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(snapshot);
        }
    }

    /// The most recently published snapshot, if any.
    pub fn latest(&self) -> Option<Arc<RgbaFrame>> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}
