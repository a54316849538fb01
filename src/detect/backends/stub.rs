use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};

/// Stub backend: pixel-hash motion detection.
///
/// Emits a single full-frame `motion` detection whenever consecutive frames
/// differ. Lets the viewer demonstrate overlays against `stub://` sources
/// and gives tests a real backend with no model file.
pub struct StubBackend {
    last_hash: Option<[u8; 32]>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { last_hash: None }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<Detection>> {
        let current_hash: [u8; 32] = Sha256::digest(pixels).into();

        let motion = match self.last_hash {
            Some(prev) => prev != current_hash,
            None => false,
        };

        self.last_hash = Some(current_hash);

        if motion {
            Ok(vec![Detection {
                label: "motion".to_string(),
                confidence: 0.85,
                bbox: BoundingBox::full(),
            }])
        } else {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_reports_nothing() {
        let mut backend = StubBackend::new();
        let detections = backend.detect(&[1, 2, 3], 1, 1).expect("detect");
        assert!(detections.is_empty());
    }

    #[test]
    fn changed_frame_reports_motion() {
        let mut backend = StubBackend::new();
        backend.detect(&[1, 2, 3], 1, 1).expect("detect");
        let detections = backend.detect(&[4, 5, 6], 1, 1).expect("detect");
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "motion");
    }

    #[test]
    fn identical_frame_reports_nothing() {
        let mut backend = StubBackend::new();
        backend.detect(&[7, 7, 7], 1, 1).expect("detect");
        let detections = backend.detect(&[7, 7, 7], 1, 1).expect("detect");
        assert!(detections.is_empty());
    }
}
