//! OpenCV-backed camera acquisition tuned for low latency.
//!
//! The crate exposes a single [`CameraDevice`] handle around a V4L/any-backend
//! `VideoCapture`. The handle is meant to be owned by exactly one capture
//! loop; it is not safe to share a capture device between callers and the API
//! makes no attempt to allow it.

pub use device::{CameraDevice, CameraTuning};
pub use types::{CaptureError, Frame, FrameFormat};

mod device;
mod types;
