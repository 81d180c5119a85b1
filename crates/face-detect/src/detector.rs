use std::{
    env,
    path::{Path, PathBuf},
};

use opencv::{
    core::{Mat, Rect, Size, Vector},
    imgproc,
    objdetect::{self, CascadeClassifier},
    prelude::*,
};
use thiserror::Error;
use tracing::{debug, info};

/// Cascade files probed in order. The default frontal model is the more
/// accurate one; alt2 is the faster fallback.
const CASCADE_FILES: [&str; 2] = [
    "haarcascade_frontalface_default.xml",
    "haarcascade_frontalface_alt2.xml",
];

/// Conventional install locations for the OpenCV haarcascade data files.
const CASCADE_DIRS: [&str; 4] = [
    "/usr/share/opencv4/haarcascades",
    "/usr/local/share/opencv4/haarcascades",
    "/usr/share/opencv/haarcascades",
    "/usr/local/share/opencv/haarcascades",
];

/// Axis-aligned face bounding box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Multi-scale detection sensitivity.
#[derive(Clone, Copy, Debug)]
pub struct DetectorParams {
    pub scale_factor: f64,
    pub min_neighbors: i32,
    pub min_size: i32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.2,
            min_neighbors: 5,
            min_size: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("no usable face cascade found (tried {tried} candidate path(s))")]
    CascadeUnavailable { tried: usize },
    #[error("invalid frame buffer: got {got} bytes, expected {expected}")]
    BadFrame { got: usize, expected: usize },
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

/// Haar-cascade detector. Loading the model is the expensive part; keep one
/// instance alive for the process and feed it frames.
pub struct FaceDetector {
    classifier: CascadeClassifier,
    params: DetectorParams,
}

impl FaceDetector {
    /// Load the first usable cascade, honoring an explicit override path and
    /// the `OPENCV_HAARCASCADES` directory variable before the conventional
    /// install locations.
    pub fn load(override_path: Option<&Path>) -> Result<Self, DetectError> {
        Self::load_with_params(override_path, DetectorParams::default())
    }

    pub fn load_with_params(
        override_path: Option<&Path>,
        params: DetectorParams,
    ) -> Result<Self, DetectError> {
        let candidates = cascade_candidates(override_path);
        for candidate in &candidates {
            if !candidate.is_file() {
                continue;
            }
            let path_str = candidate.to_string_lossy();
            let mut classifier = CascadeClassifier::default()?;
            match classifier.load(&path_str) {
                Ok(true) => {
                    info!("loaded face cascade from {}", candidate.display());
                    return Ok(Self { classifier, params });
                }
                Ok(false) => debug!("cascade {} did not load", candidate.display()),
                Err(err) => debug!("cascade {} failed to load: {err}", candidate.display()),
            }
        }
        Err(DetectError::CascadeUnavailable {
            tried: candidates.len(),
        })
    }

    /// Run multi-scale detection over a BGR8 buffer. The input is only read;
    /// drawing on a copy is the caller's business.
    pub fn detect(
        &mut self,
        bgr: &[u8],
        width: i32,
        height: i32,
    ) -> Result<Vec<FaceBox>, DetectError> {
        let expected = (width as usize) * (height as usize) * 3;
        if bgr.len() != expected {
            return Err(DetectError::BadFrame {
                got: bgr.len(),
                expected,
            });
        }

        let flat = Mat::from_slice(bgr)?;
        let frame = flat.reshape(3, height)?;
        let mut gray = Mat::default();
        imgproc::cvt_color(&frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        let min = self.params.min_size;
        let mut faces = Vector::<Rect>::new();
        self.classifier.detect_multi_scale(
            &gray,
            &mut faces,
            self.params.scale_factor,
            self.params.min_neighbors,
            objdetect::CASCADE_SCALE_IMAGE,
            Size::new(min, min),
            Size::new(0, 0),
        )?;

        Ok(faces
            .iter()
            .map(|rect| FaceBox {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
            })
            .collect())
    }
}

fn cascade_candidates(override_path: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = override_path {
        candidates.push(path.to_path_buf());
    }

    let mut dirs: Vec<PathBuf> = Vec::new();
    if let Ok(env_dir) = env::var("OPENCV_HAARCASCADES") {
        dirs.push(PathBuf::from(env_dir));
    }
    dirs.extend(CASCADE_DIRS.iter().map(PathBuf::from));

    for file in CASCADE_FILES {
        for dir in &dirs {
            candidates.push(dir.join(file));
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_path_is_probed_first() {
        let override_path = PathBuf::from("/tmp/custom_cascade.xml");
        let candidates = cascade_candidates(Some(&override_path));
        assert_eq!(candidates[0], override_path);
    }

    #[test]
    fn default_model_is_preferred_over_alt2() {
        let candidates = cascade_candidates(None);
        let first_default = candidates
            .iter()
            .position(|p| p.ends_with("haarcascade_frontalface_default.xml"))
            .unwrap();
        let first_alt2 = candidates
            .iter()
            .position(|p| p.ends_with("haarcascade_frontalface_alt2.xml"))
            .unwrap();
        assert!(first_default < first_alt2);
    }

    #[test]
    fn default_params_match_detection_tuning() {
        let params = DetectorParams::default();
        assert_eq!(params.scale_factor, 1.2);
        assert_eq!(params.min_neighbors, 5);
        assert_eq!(params.min_size, 30);
    }
}
