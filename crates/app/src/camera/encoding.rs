//! JPEG encoding and multipart framing for the MJPEG feed.
//!
//! Each viewer connection encodes independently from the store's current
//! frame; nothing here is shared between viewers.

use anyhow::{anyhow, bail, Result};
use image::{codecs::jpeg::JpegEncoder, ImageBuffer, Rgb};
use video_ingest::{Frame, FrameFormat};

pub(crate) const MULTIPART_BOUNDARY: &str = "frame";

/// Default JPEG quality; tuned for latency over fidelity.
pub const DEFAULT_JPEG_QUALITY: i32 = 70;

/// Compress a BGR frame into a quality-bounded JPEG.
pub(crate) fn encode_jpeg(frame: &Frame, quality: i32) -> Result<Vec<u8>> {
    if frame.format != FrameFormat::Bgr8 {
        bail!("unsupported frame format");
    }
    let rgb = bgr_to_rgb(&frame.data);
    let image =
        ImageBuffer::<Rgb<u8>, Vec<u8>>::from_vec(frame.width as u32, frame.height as u32, rgb)
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;

    let mut buffer = Vec::new();
    let quality = quality.clamp(1, 100) as u8;
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(&image)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    Ok(buffer)
}

/// Wrap one JPEG into a multipart part:
/// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<bytes>\r\n`.
pub(crate) fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(jpeg.len() + 64);
    payload.extend_from_slice(b"--frame\r\n");
    payload.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    payload
}

fn bgr_to_rgb(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
    }
    output
}
