//! Camera core: capture, latest-frame sharing, detection, and streaming.
//!
//! The module is split into focused submodules:
//! - `store`: single-slot latest-frame cache shared by all consumers.
//! - `pipeline`: capture loop, rate pacing, and the process-wide lifecycle.
//! - `annotate`: face box drawing on frame copies.
//! - `encoding`: JPEG compression and multipart framing for the stream.
//! - `server`: Actix Web routes for the feed and the control endpoints.

/// Re-export the lifecycle surface so callers can start and stop the camera
/// without reaching into submodules.
pub use pipeline::{get_or_start, shutdown, CameraOptions, CameraService};
pub use store::{Detection, FrameStore, FrameView};

pub(crate) mod annotate;
pub(crate) mod encoding;
mod pipeline;
pub(crate) mod server;
mod store;
