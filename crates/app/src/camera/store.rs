//! Latest-frame store shared between the capture loop and HTTP consumers.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use face_detect::FaceBox;
use video_ingest::Frame;

/// Result of one detection pass, paired with the annotated frame it was
/// computed from.
#[derive(Clone, Debug, Default)]
pub struct Detection {
    pub count: usize,
    pub boxes: Vec<FaceBox>,
}

/// Snapshot handed to readers: the frame plus, when it came from the
/// detection stage, the paired result.
#[derive(Clone)]
pub struct FrameView {
    pub frame: Arc<Frame>,
    pub detection: Option<Arc<Detection>>,
}

#[derive(Default)]
struct Slots {
    raw: Option<Arc<Frame>>,
    annotated: Option<(Arc<Frame>, Arc<Detection>)>,
}

/// Single-slot cache of the most recent raw and annotated frames.
///
/// One mutex serializes every publish and read. Critical sections only swap
/// `Arc`s (no decoding, drawing, or I/O happens under the lock), so neither
/// the capture loop nor any viewer can hold the other up for longer than a
/// pointer exchange. The detection flag is a lone atomic; nothing reads it
/// and writes it back in one compound step.
#[derive(Default)]
pub struct FrameStore {
    slots: Mutex<Slots>,
    detection_active: AtomicBool,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the newest decoded frame. Only the capture loop calls this.
    pub fn publish_raw(&self, frame: Arc<Frame>) {
        self.lock_slots().raw = Some(frame);
    }

    /// Publish an annotated frame together with its detection result; both
    /// become visible to readers in the same swap.
    pub fn publish_annotated(&self, frame: Arc<Frame>, detection: Detection) {
        let annotated = (frame, Arc::new(detection));
        self.lock_slots().annotated = Some(annotated);
    }

    /// Current frame for consumers: the annotated frame while detection is
    /// active and one exists, otherwise the raw frame, otherwise none.
    pub fn read_current(&self) -> Option<FrameView> {
        let detection_on = self.detection_active();
        let slots = self.lock_slots();
        if detection_on {
            if let Some((frame, detection)) = slots.annotated.as_ref() {
                return Some(FrameView {
                    frame: frame.clone(),
                    detection: Some(detection.clone()),
                });
            }
        }
        slots.raw.as_ref().map(|frame| FrameView {
            frame: frame.clone(),
            detection: None,
        })
    }

    /// Face count of the last detection pass; 0 while detection is inactive
    /// or has not yet produced a result.
    pub fn face_count(&self) -> usize {
        if !self.detection_active() {
            return 0;
        }
        self.lock_slots()
            .annotated
            .as_ref()
            .map(|(_, detection)| detection.count)
            .unwrap_or(0)
    }

    pub fn set_detection_active(&self, active: bool) {
        self.detection_active.store(active, Ordering::Relaxed);
    }

    pub fn detection_active(&self) -> bool {
        self.detection_active.load(Ordering::Relaxed)
    }

    fn lock_slots(&self) -> MutexGuard<'_, Slots> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_ingest::FrameFormat;

    fn frame(timestamp_ms: i64) -> Arc<Frame> {
        Arc::new(Frame {
            data: vec![0; 12],
            width: 2,
            height: 2,
            timestamp_ms,
            format: FrameFormat::Bgr8,
        })
    }

    fn boxes(n: usize) -> Vec<FaceBox> {
        (0..n)
            .map(|i| FaceBox {
                x: i as i32 * 10,
                y: 0,
                width: 8,
                height: 8,
            })
            .collect()
    }

    #[test]
    fn empty_store_reads_none() {
        let store = FrameStore::new();
        assert!(store.read_current().is_none());
        assert_eq!(store.face_count(), 0);
    }

    #[test]
    fn raw_frame_is_served_when_detection_inactive() {
        let store = FrameStore::new();
        store.publish_raw(frame(1));
        let view = store.read_current().unwrap();
        assert_eq!(view.frame.timestamp_ms, 1);
        assert!(view.detection.is_none());
    }

    #[test]
    fn annotated_frame_is_hidden_while_flag_clear() {
        let store = FrameStore::new();
        store.publish_raw(frame(1));
        store.publish_annotated(
            frame(2),
            Detection {
                count: 1,
                boxes: boxes(1),
            },
        );
        let view = store.read_current().unwrap();
        assert_eq!(view.frame.timestamp_ms, 1);
        assert!(view.detection.is_none());
        assert_eq!(store.face_count(), 0);
    }

    #[test]
    fn annotated_frame_is_served_while_flag_set() {
        let store = FrameStore::new();
        store.set_detection_active(true);
        store.publish_raw(frame(1));
        store.publish_annotated(
            frame(2),
            Detection {
                count: 3,
                boxes: boxes(3),
            },
        );
        let view = store.read_current().unwrap();
        assert_eq!(view.frame.timestamp_ms, 2);
        assert_eq!(view.detection.unwrap().count, 3);
        assert_eq!(store.face_count(), 3);
    }

    #[test]
    fn detection_result_stays_paired_with_its_frame() {
        let store = FrameStore::new();
        store.set_detection_active(true);
        store.publish_annotated(
            frame(10),
            Detection {
                count: 1,
                boxes: boxes(1),
            },
        );
        store.publish_annotated(
            frame(20),
            Detection {
                count: 2,
                boxes: boxes(2),
            },
        );
        let view = store.read_current().unwrap();
        let detection = view.detection.unwrap();
        // The newer frame must carry the newer result, never a mix.
        assert_eq!(view.frame.timestamp_ms, 20);
        assert_eq!(detection.count, 2);
        assert_eq!(detection.boxes.len(), 2);
    }

    #[test]
    fn flag_falls_back_to_raw_before_first_detection() {
        let store = FrameStore::new();
        store.set_detection_active(true);
        store.publish_raw(frame(5));
        let view = store.read_current().unwrap();
        assert_eq!(view.frame.timestamp_ms, 5);
        assert!(view.detection.is_none());
        assert_eq!(store.face_count(), 0);
    }
}
