//! Camera device handle with latest-frame semantics.

use anyhow::Result;
use chrono::Utc;
use opencv::{
    core::{self, Mat, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use tracing::{debug, warn};

use crate::types::{CaptureError, Frame, FrameFormat};

/// Reads issued per grab cycle. Device drivers commonly queue a couple of
/// frames internally; reading twice and keeping the newest drains that queue
/// so viewers see the freshest possible image.
const BUFFER_DRAIN_READS: usize = 2;

/// Acquisition parameters applied to the device, best-effort.
#[derive(Clone, Copy, Debug)]
pub struct CameraTuning {
    pub width: i32,
    pub height: i32,
    pub fps: f64,
}

impl Default for CameraTuning {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
        }
    }
}

/// Handle around an opened `VideoCapture`.
///
/// `close()` is idempotent; every other operation fails with
/// [`CaptureError::Closed`] after the device has been released.
pub struct CameraDevice {
    inner: Option<VideoCapture>,
    uri: String,
    target_size: (i32, i32),
}

impl CameraDevice {
    /// Open a camera input either by index (`0`, `/dev/video0`) or URI,
    /// preferring the V4L backend.
    pub fn open(uri: &str) -> Result<Self, CaptureError> {
        let cap = open_video_capture(uri)?;
        Ok(Self {
            inner: Some(cap),
            uri: uri.to_string(),
            target_size: (CameraTuning::default().width, CameraTuning::default().height),
        })
    }

    /// Apply acquisition settings. Unsupported properties are logged and
    /// skipped; configuration never fails.
    pub fn configure(&mut self, tuning: &CameraTuning) {
        let Some(cap) = self.inner.as_mut() else {
            return;
        };

        // Minimal internal buffering keeps the driver from serving stale
        // frames when the loop falls behind.
        set_prop(cap, "buffer size", videoio::CAP_PROP_BUFFERSIZE, 1.0);

        let mut fourcc_set = false;
        if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
            if matches!(cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64), Ok(true)) {
                fourcc_set = true;
            }
        }
        if !fourcc_set {
            if let Ok(yuyv) = videoio::VideoWriter::fourcc('Y', 'U', 'Y', 'V') {
                let _ = cap.set(videoio::CAP_PROP_FOURCC, yuyv as f64);
            }
        }

        set_prop(cap, "width", videoio::CAP_PROP_FRAME_WIDTH, tuning.width as f64);
        set_prop(cap, "height", videoio::CAP_PROP_FRAME_HEIGHT, tuning.height as f64);
        set_prop(cap, "fps", videoio::CAP_PROP_FPS, tuning.fps);
        // Autofocus hunting causes periodic multi-frame stalls on UVC cameras.
        set_prop(cap, "autofocus", videoio::CAP_PROP_AUTOFOCUS, 0.0);

        self.target_size = (tuning.width, tuning.height);
    }

    /// Grab the newest frame the device can produce right now.
    ///
    /// Issues [`BUFFER_DRAIN_READS`] consecutive reads and keeps only the last
    /// successfully decoded one. Fails with [`CaptureError::NoFrame`] when the
    /// whole cycle produced nothing decodable.
    pub fn grab_latest(&mut self) -> Result<Frame, CaptureError> {
        let cap = self.inner.as_mut().ok_or(CaptureError::Closed)?;

        let mut scratch = Mat::default();
        let mut kept = Mat::default();
        let mut grabbed = false;

        for _ in 0..BUFFER_DRAIN_READS {
            match cap.read(&mut scratch) {
                Ok(true) => {
                    let size = scratch.size().map_err(|e| CaptureError::Other(e.into()))?;
                    if size.width > 0 {
                        std::mem::swap(&mut kept, &mut scratch);
                        grabbed = true;
                    }
                }
                Ok(false) => {}
                Err(err) => debug!("camera read error on {}: {err}", self.uri),
            }
        }

        if !grabbed {
            return Err(CaptureError::NoFrame);
        }

        let size = kept.size().map_err(|e| CaptureError::Other(e.into()))?;
        let (target_w, target_h) = self.target_size;
        let working = if size.width != target_w || size.height != target_h {
            let mut resized = Mat::default();
            opencv::imgproc::resize(
                &kept,
                &mut resized,
                core::Size {
                    width: target_w,
                    height: target_h,
                },
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )
            .map_err(|e| CaptureError::Other(e.into()))?;
            resized
        } else {
            kept
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        Ok(Frame {
            data,
            width: target_w,
            height: target_h,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        })
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Release the underlying device. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut cap) = self.inner.take() {
            if let Err(err) = cap.release() {
                warn!("failed to release camera {}: {err}", self.uri);
            }
        }
    }
}

impl Drop for CameraDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if stripped.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = stripped.parse::<i32>() {
                return Some(index);
            }
        }
    }
    None
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    debug!("failed to open device #{index} with backend {backend}: {err}");
                }
            }
        }
    }

    for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
        match VideoCapture::from_file(uri, backend) {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                debug!("failed to open {uri} with backend {backend}: {err}");
            }
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

fn set_prop(cap: &mut VideoCapture, label: &str, prop: i32, value: f64) {
    match cap.set(prop, value) {
        Ok(true) => {}
        Ok(false) => debug!("camera ignored {label} setting"),
        Err(err) => debug!("failed to set camera {label}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_device_index;

    #[test]
    fn parses_bare_index() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("3"), Some(3));
    }

    #[test]
    fn parses_dev_video_path() {
        assert_eq!(parse_device_index("/dev/video0"), Some(0));
        assert_eq!(parse_device_index("/dev/video12"), Some(12));
    }

    #[test]
    fn rejects_non_device_uris() {
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("/dev/video0a"), None);
        assert_eq!(parse_device_index("rtsp://host/stream"), None);
    }
}
