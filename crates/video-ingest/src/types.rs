use anyhow::Error;
use thiserror::Error;

/// Raw BGR frame captured from a video source.
///
/// Frames are plain byte buffers so downstream stages can annotate and encode
/// them without holding any OpenCV types. Once published a frame is never
/// mutated; consumers receive it behind an `Arc`.
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("camera produced no frame this cycle")]
    NoFrame,
    #[error("camera device already released")]
    Closed,
    #[error(transparent)]
    Other(#[from] Error),
}
