//! export — finished rasters → transport sink
//!
//! Serialises a composited frame into the flat pixel buffer an external
//! real-time transport expects, and defines the sink boundary itself. The
//! core never decides *whether* to send; the calling layer owns the
//! session-active flag and invokes the sink only while a session runs.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::video::RgbaFrame;

/// Pixel format tag accompanying an exported buffer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba,
}

impl PixelFormat {
    /// Numeric tag the transport layer uses for this format.
    pub fn wire_tag(self) -> i32 {
        match self {
            PixelFormat::Rgba => 4,
        }
    }
}

/// Outgoing-video boundary. Accepts tightly packed pixel data with no row
/// padding, plus the capture timestamp in milliseconds.
pub trait VideoSink {
    fn consume(
        &mut self,
        data: &[u8],
        format: PixelFormat,
        width: u32,
        height: u32,
        timestamp_ms: i64,
    ) -> Result<()>;
}

/// Serialise a frame into a fresh, tightly packed RGBA buffer of exactly
/// `width × height × 4` bytes.
pub fn pack_rgba(frame: &RgbaFrame) -> Vec<u8> {
    frame.data[..frame.byte_len()].to_vec()
}

/// File-backed sink: appends each frame's raw pixels to one file. Useful for
/// piping into external tools and for exercising the sink boundary in tests.
pub struct FileSink {
    writer: BufWriter<File>,
    frames: u64,
}

impl FileSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("failed to create sink file {}", path.as_ref().display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            frames: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl VideoSink for FileSink {
    fn consume(
        &mut self,
        data: &[u8],
        _format: PixelFormat,
        _width: u32,
        _height: u32,
        _timestamp_ms: i64,
    ) -> Result<()> {
        self.writer
            .write_all(data)
            .context("failed to write frame to sink file")?;
        self.frames += 1;
        Ok(())
    }
}
