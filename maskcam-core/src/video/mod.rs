//! video — FFmpeg bridge
//!
//! Opens a video, iterates decoded frames as RGBA rasters, re-encodes with an
//! arbitrary per-frame transform applied, and muxes the result back to disk.
//!
//! The frame callback is kept generic (`FnMut`) so the overlay pipeline (or a
//! debug renderer) can slot in without this module knowing about it.

use anyhow::{ensure, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, encoder, format, frame, media, software::scaling, util::rational::Rational};
use std::path::Path;
use tracing::{debug, info};

/// Output pixel format for the encoder (YUV420p is universally compatible).
const ENCODE_FORMAT: format::Pixel = format::Pixel::YUV420P;
/// Scaling flags for the decode→RGBA and RGBA→encode conversions.
const SCALE_FLAGS: scaling::Flags = scaling::Flags::BILINEAR;

/// A single RGBA raster plus its presentation timestamp (in the source
/// stream's time-base units).
///
/// The buffer is tightly packed, row-major, 4 bytes per pixel. Whichever
/// pipeline stage holds the frame owns it exclusively; stages hand frames off
/// by value, never by shared reference.
#[derive(Clone)]
pub struct RgbaFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub pts: i64,
}

impl RgbaFrame {
    /// Allocate a zeroed (fully transparent black) frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; (width * height * 4) as usize],
            width,
            height,
            pts: 0,
        }
    }

    /// Wrap an existing buffer, validating the dimension invariant.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>, pts: i64) -> Result<Self> {
        ensure!(width > 0 && height > 0, "frame dimensions must be non-zero");
        ensure!(
            data.len() == (width * height * 4) as usize,
            "frame buffer is {} bytes, expected {} for {}x{} RGBA",
            data.len(),
            width * height * 4,
            width,
            height
        );
        Ok(Self {
            data,
            width,
            height,
            pts,
        })
    }

    /// Buffer length implied by the frame dimensions.
    pub fn byte_len(&self) -> usize {
        (self.width * self.height * 4) as usize
    }
}

/// Open `input_path`, apply `frame_fn` to every frame (receives a mutable
/// [`RgbaFrame`] — modify in-place to transform the output), and write the
/// result to `output_path` encoded as H.264.
///
/// The output stream carries video only; the AR frames are what matter here
/// and any audio track of the source file is not preserved.
pub fn transcode<P, Q, F>(input_path: P, output_path: Q, mut frame_fn: F) -> Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    F: FnMut(&mut RgbaFrame),
{
    ffmpeg::init().context("failed to initialise FFmpeg")?;

    let mut ictx = format::input(&input_path).context("could not open input file")?;

    let video_stream_index = ictx
        .streams()
        .best(media::Type::Video)
        .context("no video stream found in input")?
        .index();

    let input_video_stream = ictx.stream(video_stream_index).unwrap();
    let video_time_base = input_video_stream.time_base();
    let frame_rate = input_video_stream.avg_frame_rate();

    let decoder_ctx = codec::context::Context::from_parameters(input_video_stream.parameters())
        .context("failed to build decoder context")?;
    let mut decoder = decoder_ctx
        .decoder()
        .video()
        .context("failed to open video decoder")?;

    let src_width = decoder.width();
    let src_height = decoder.height();
    let src_pixel_fmt = decoder.format();

    info!(
        src_width,
        src_height,
        ?src_pixel_fmt,
        "opened input video stream"
    );

    // Scaler: decoded frame → RGBA for the callback (fixed source size)
    let mut to_rgba = scaling::Context::get(
        src_pixel_fmt,
        src_width,
        src_height,
        format::Pixel::RGBA,
        src_width,
        src_height,
        SCALE_FLAGS,
    )
    .context("failed to create to-RGBA scaler")?;

    let mut octx = format::output(&output_path).context("could not create output context")?;

    let global_header = octx
        .format()
        .flags()
        .contains(format::flag::Flags::GLOBAL_HEADER);

    let encoder_codec = encoder::find(codec::Id::H264)
        .context("H.264 encoder not found — is FFmpeg built with libx264?")?;

    // Encoder/muxer setup is deferred until after the first frame_fn call: the
    // transform may change frame size (orientation correction swaps the axes
    // for 90°/270° capture rotations).
    struct EncoderState {
        video_encoder: encoder::Video,
        to_yuv: scaling::Context,
        out_rgba_frame: frame::Video,
        yuv_frame: frame::Video,
        video_out_index: usize,
        out_width: u32,
        out_height: u32,
    }

    let mut enc_state: Option<EncoderState> = None;

    let mut decoded_frame = frame::Video::empty();
    let mut rgba_avframe = frame::Video::empty();
    let mut frame_count = 0u64;

    // One path for every decoded frame, whether it arrives during normal
    // demuxing or while draining the decoder at EOF: convert to RGBA, run the
    // caller's transform, encode.
    let mut process_decoded = |decoded_frame: &frame::Video,
                               octx: &mut format::context::Output,
                               enc_state: &mut Option<EncoderState>|
     -> Result<()> {
        to_rgba
            .run(decoded_frame, &mut rgba_avframe)
            .context("to-RGBA scaling failed")?;

        // Compact to a plain Vec<u8> (remove stride padding if any)
        let stride = rgba_avframe.stride(0);
        let raw = rgba_avframe.data(0);
        let row_bytes = src_width as usize * 4;
        let mut rgba_data = Vec::with_capacity(row_bytes * src_height as usize);
        for row in 0..src_height as usize {
            let start = row * stride;
            rgba_data.extend_from_slice(&raw[start..start + row_bytes]);
        }

        let pts = decoded_frame.pts().unwrap_or(frame_count as i64);

        let mut rgba = RgbaFrame {
            data: rgba_data,
            width: src_width,
            height: src_height,
            pts,
        };

        frame_fn(&mut rgba);

        // After the callback, rgba.width/height reflect the output size.
        let out_w = rgba.width;
        let out_h = rgba.height;

        if enc_state.is_none() {
            let mut video_out_stream = octx.add_stream(encoder_codec)?;
            let encoder_ctx = codec::context::Context::new_with_codec(encoder_codec);
            let mut video_encoder_builder = encoder_ctx.encoder().video()?;

            video_encoder_builder.set_width(out_w);
            video_encoder_builder.set_height(out_h);
            video_encoder_builder.set_format(ENCODE_FORMAT);
            video_encoder_builder.set_time_base(video_time_base);
            video_encoder_builder.set_frame_rate(Some(frame_rate));
            if global_header {
                video_encoder_builder.set_flags(codec::flag::Flags::GLOBAL_HEADER);
            }

            let video_encoder = video_encoder_builder
                .open_as_with(
                    encoder_codec,
                    ffmpeg_next::Dictionary::from_iter([("crf", "18"), ("preset", "fast")]),
                )
                .context("failed to open H.264 encoder")?;

            video_out_stream.set_parameters(&video_encoder);
            let video_out_index = video_out_stream.index();

            let to_yuv = scaling::Context::get(
                format::Pixel::RGBA,
                out_w,
                out_h,
                ENCODE_FORMAT,
                out_w,
                out_h,
                SCALE_FLAGS,
            )
            .context("failed to create to-YUV scaler")?;

            info!(out_w, out_h, "output dimensions determined; writing header");
            octx.write_header()
                .context("failed to write output header")?;

            *enc_state = Some(EncoderState {
                video_encoder,
                to_yuv,
                out_rgba_frame: frame::Video::new(format::Pixel::RGBA, out_w, out_h),
                yuv_frame: frame::Video::empty(),
                video_out_index,
                out_width: out_w,
                out_height: out_h,
            });
        }

        let state = enc_state.as_mut().unwrap();

        // Write the transformed RGBA data into the output AVFrame, honouring
        // the encoder frame's stride.
        let out_stride = state.out_rgba_frame.stride(0);
        let out_row_bytes = state.out_width as usize * 4;
        let plane_data = state.out_rgba_frame.data_mut(0);
        for row in 0..state.out_height as usize {
            let dst_start = row * out_stride;
            let src_start = row * out_row_bytes;
            plane_data[dst_start..dst_start + out_row_bytes]
                .copy_from_slice(&rgba.data[src_start..src_start + out_row_bytes]);
        }

        state
            .to_yuv
            .run(&state.out_rgba_frame, &mut state.yuv_frame)
            .context("to-YUV scaling failed")?;

        state.yuv_frame.set_pts(Some(pts));

        state
            .video_encoder
            .send_frame(&state.yuv_frame)
            .context("encoder send_frame")?;

        drain_encoder(
            &mut state.video_encoder,
            octx,
            state.video_out_index,
            video_time_base,
        )?;

        frame_count += 1;
        if frame_count % 100 == 0 {
            debug!(frame_count, "processed frames");
        }
        Ok(())
    };

    for (stream, packet) in ictx.packets() {
        if stream.index() != video_stream_index {
            continue;
        }

        decoder
            .send_packet(&packet)
            .context("decoder send_packet")?;

        while decoder.receive_frame(&mut decoded_frame).is_ok() {
            process_decoded(&decoded_frame, &mut octx, &mut enc_state)?;
        }
    }

    // Flush decoder: frames still buffered at EOF take the same path as every
    // other frame, transform included.
    decoder.send_eof().ok();
    while decoder.receive_frame(&mut decoded_frame).is_ok() {
        process_decoded(&decoded_frame, &mut octx, &mut enc_state)?;
    }

    let state = enc_state
        .as_mut()
        .context("no video frames were processed")?;

    // Flush encoder
    state.video_encoder.send_eof().ok();
    drain_encoder(
        &mut state.video_encoder,
        &mut octx,
        state.video_out_index,
        video_time_base,
    )?;

    octx.write_trailer()
        .context("failed to write output trailer")?;

    info!(frame_count, "transcode complete");
    Ok(())
}

/// Drain all pending packets from the encoder and write them to the muxer.
fn drain_encoder(
    encoder: &mut encoder::Video,
    octx: &mut format::context::Output,
    stream_index: usize,
    time_base: Rational,
) -> Result<()> {
    let mut encoded = ffmpeg_next::Packet::empty();
    while encoder.receive_packet(&mut encoded).is_ok() {
        encoded.set_stream(stream_index);
        encoded.rescale_ts(time_base, octx.stream(stream_index).unwrap().time_base());
        encoded
            .write_interleaved(octx)
            .context("failed to write encoded packet")?;
    }
    Ok(())
}
