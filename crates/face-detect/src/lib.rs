//! Haar-cascade face detection over raw BGR frame buffers.
//!
//! The detector is deliberately independent of the capture pipeline: it takes
//! plain byte slices plus dimensions and returns pixel-space boxes, so callers
//! decide how to annotate and what to do with the counts.

pub use detector::{DetectError, DetectorParams, FaceBox, FaceDetector};

mod detector;
