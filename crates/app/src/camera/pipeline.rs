//! Capture loop and process-wide camera lifecycle.
//!
//! One background thread owns the device for the lifetime of a
//! [`CameraService`]: it drains the driver queue, publishes the newest frame
//! into the store, and runs the face-detection pass at a bounded rate. HTTP
//! consumers only ever touch the store.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, OnceLock,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use face_detect::FaceDetector;
use tracing::{debug, error, warn};
use video_ingest::{CameraDevice, CameraTuning, Frame};

use crate::camera::{
    annotate,
    store::{Detection, FrameStore},
};
use crate::telemetry;

/// Floor on the capture cycle period; bounds the internal loop to ~100 Hz
/// when the device is faster than needed.
const MIN_CYCLE_INTERVAL: Duration = Duration::from_millis(10);

/// Detection runs at most once per this interval regardless of cycle rate.
const DETECTION_INTERVAL: Duration = Duration::from_millis(100);

/// How long `stop()` waits for the capture thread before abandoning it.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Settings for one camera service instance.
#[derive(Clone, Debug)]
pub struct CameraOptions {
    pub device: String,
    pub tuning: CameraTuning,
    pub cascade: Option<PathBuf>,
    pub detect_on_start: bool,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            tuning: CameraTuning::default(),
            cascade: None,
            detect_on_start: false,
        }
    }
}

/// Running capture pipeline: the device, its capture thread, and the shared
/// frame store.
pub struct CameraService {
    store: Arc<FrameStore>,
    device: Arc<Mutex<Option<CameraDevice>>>,
    running: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CameraService {
    /// Open and tune the device, then spawn the capture loop.
    pub fn start(options: &CameraOptions) -> Result<Arc<Self>> {
        let mut device = CameraDevice::open(&options.device)
            .with_context(|| format!("failed to open camera {}", options.device))?;
        device.configure(&options.tuning);

        let store = Arc::new(FrameStore::new());
        store.set_detection_active(options.detect_on_start);

        let running = Arc::new(AtomicBool::new(true));
        let device = Arc::new(Mutex::new(Some(device)));
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);

        let loop_store = store.clone();
        let loop_device = device.clone();
        let loop_running = running.clone();
        let cascade = options.cascade.clone();
        let handle = telemetry::spawn_thread("camera-capture", move || {
            capture_loop(loop_device, loop_store, loop_running, cascade);
            let _ = done_tx.send(());
        })
        .context("failed to spawn capture thread")?;

        debug!("camera capture loop started for {}", options.device);
        Ok(Arc::new(Self {
            store,
            device,
            running,
            done_rx,
            handle: Mutex::new(Some(handle)),
        }))
    }

    pub fn store(&self) -> Arc<FrameStore> {
        self.store.clone()
    }

    pub fn is_running(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        match self.handle.lock() {
            Ok(guard) => guard.as_ref().map(|h| !h.is_finished()).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Signal the capture loop to exit, wait for it within a bounded timeout,
    /// and make sure the device ends up released. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        match self.done_rx.recv_timeout(STOP_JOIN_TIMEOUT) {
            Ok(()) => {
                let _ = handle.join();
                debug!("capture loop stopped");
            }
            Err(_) => {
                warn!(
                    "capture thread did not exit within {:?}; abandoning it",
                    STOP_JOIN_TIMEOUT
                );
                // Reclaim the device out from under the stale thread if it is
                // not in the middle of a read.
                match self.device.try_lock() {
                    Ok(mut slot) => {
                        if let Some(mut dev) = slot.take() {
                            dev.close();
                        }
                    }
                    Err(_) => warn!("device handle still held by stale capture thread"),
                }
            }
        }
    }
}

static CAMERA: OnceLock<Mutex<Option<Arc<CameraService>>>> = OnceLock::new();

/// Get the running camera service, creating it on first access or after a
/// previous instance stopped or failed.
pub fn get_or_start(options: &CameraOptions) -> Result<Arc<CameraService>> {
    let slot = CAMERA.get_or_init(|| Mutex::new(None));
    let mut guard = match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(service) = guard.as_ref() {
        if service.is_running() {
            return Ok(service.clone());
        }
    }
    let service = CameraService::start(options)?;
    *guard = Some(service.clone());
    Ok(service)
}

/// Stop the camera if one is running. Safe to call when none was started.
pub fn shutdown() {
    let Some(slot) = CAMERA.get() else {
        return;
    };
    let mut guard = match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(service) = guard.take() {
        service.stop();
    }
}

fn capture_loop(
    device: Arc<Mutex<Option<CameraDevice>>>,
    store: Arc<FrameStore>,
    running: Arc<AtomicBool>,
    cascade: Option<PathBuf>,
) {
    let mut pacer = CyclePacer::new(MIN_CYCLE_INTERVAL);
    let mut gate = DetectionGate::new(DETECTION_INTERVAL);
    let mut detector: Option<FaceDetector> = None;
    let mut detector_failed = false;
    let mut frames: u64 = 0;
    let mut read_errors: u64 = 0;
    let mut last_instant = Instant::now();

    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if let Some(delay) = pacer.next_delay(now) {
            thread::sleep(delay);
            continue;
        }

        let grabbed = {
            let mut slot = match device.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let Some(dev) = slot.as_mut() else {
                // stop() reclaimed the device; nothing left to capture.
                break;
            };
            dev.grab_latest()
        };

        let frame = match grabbed {
            Ok(frame) => Arc::new(frame),
            Err(err) => {
                read_errors = read_errors.wrapping_add(1);
                metrics::counter!("camera_capture_read_errors_total").increment(1);
                debug!("camera read failed (total {read_errors}): {err}");
                continue;
            }
        };

        frames = frames.wrapping_add(1);
        let elapsed = now.duration_since(last_instant).as_secs_f64();
        last_instant = now;
        metrics::counter!("camera_capture_frames_total").increment(1);
        metrics::histogram!("camera_capture_frame_interval_seconds").record(elapsed);

        store.publish_raw(frame.clone());

        if frames % 300 == 0 {
            debug!(
                "capture heartbeat: frame #{frames}, ts={}",
                frame.timestamp_ms
            );
        }

        if !detector_failed && store.detection_active() && gate.due(now) {
            if detector.is_none() {
                match FaceDetector::load(cascade.as_deref()) {
                    Ok(loaded) => detector = Some(loaded),
                    Err(err) => {
                        error!("face detection disabled for this run: {err}");
                        detector_failed = true;
                        continue;
                    }
                }
            }
            if let Some(det) = detector.as_mut() {
                run_detection(det, &store, &frame);
            }
        }
    }

    // Normal teardown path: the loop owns the device and releases it on exit.
    let mut slot = match device.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(mut dev) = slot.take() {
        dev.close();
    }
    debug!("capture loop exited after {frames} frame(s)");
}

fn run_detection(detector: &mut FaceDetector, store: &FrameStore, frame: &Arc<Frame>) {
    let started = Instant::now();
    match detector.detect(&frame.data, frame.width, frame.height) {
        Ok(boxes) => {
            let annotated = Arc::new(annotate::draw_face_boxes(frame, &boxes));
            let detection = Detection {
                count: boxes.len(),
                boxes,
            };
            metrics::counter!("camera_detection_passes_total").increment(1);
            metrics::histogram!("camera_detection_seconds")
                .record(started.elapsed().as_secs_f64());
            metrics::gauge!("camera_faces_detected").set(detection.count as f64);
            store.publish_annotated(annotated, detection);
        }
        Err(err) => warn!("face detection pass failed: {err}"),
    }
}

/// Rate limiter for the capture loop: a cycle may start only when the minimum
/// interval has elapsed since the previous cycle start.
struct CyclePacer {
    min_interval: Duration,
    last: Option<Instant>,
}

impl CyclePacer {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Time still to wait before the next cycle may begin, or `None` when the
    /// cycle may proceed (in which case the cycle start is recorded).
    fn next_delay(&mut self, now: Instant) -> Option<Duration> {
        if let Some(last) = self.last {
            let elapsed = now.duration_since(last);
            if elapsed < self.min_interval {
                return Some(self.min_interval - elapsed);
            }
        }
        self.last = Some(now);
        None
    }
}

/// Gate limiting detection passes to one per interval.
struct DetectionGate {
    interval: Duration,
    last: Option<Instant>,
}

impl DetectionGate {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    fn due(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacer_allows_first_cycle_immediately() {
        let mut pacer = CyclePacer::new(Duration::from_millis(10));
        assert!(pacer.next_delay(Instant::now()).is_none());
    }

    #[test]
    fn pacer_bounds_cycle_rate() {
        let mut pacer = CyclePacer::new(Duration::from_millis(10));
        let base = Instant::now();
        // Simulate one second of 1 ms polling; at a 10 ms floor no more than
        // ~101 cycles may be admitted.
        let mut admitted = 0;
        for step in 0..1000 {
            let now = base + Duration::from_millis(step);
            if pacer.next_delay(now).is_none() {
                admitted += 1;
            }
        }
        assert!(admitted <= 101, "admitted {admitted} cycles");
        assert!(admitted >= 99, "admitted {admitted} cycles");
    }

    #[test]
    fn pacer_reports_remaining_delay() {
        let mut pacer = CyclePacer::new(Duration::from_millis(10));
        let base = Instant::now();
        assert!(pacer.next_delay(base).is_none());
        let delay = pacer.next_delay(base + Duration::from_millis(4)).unwrap();
        assert_eq!(delay, Duration::from_millis(6));
    }

    #[test]
    fn gate_runs_at_most_once_per_interval() {
        let mut gate = DetectionGate::new(Duration::from_millis(100));
        let base = Instant::now();
        // 10 ms cycles over one second: at most 11 passes may fire.
        let mut passes = 0;
        for step in 0..100 {
            let now = base + Duration::from_millis(step * 10);
            if gate.due(now) {
                passes += 1;
            }
        }
        assert!(passes <= 11, "gate fired {passes} times");
        assert!(passes >= 10, "gate fired {passes} times");
    }

    #[test]
    fn gate_fires_immediately_on_first_check() {
        let mut gate = DetectionGate::new(Duration::from_millis(100));
        assert!(gate.due(Instant::now()));
    }
}
