//! Annotation pipeline.
//!
//! `Annotator` optionally passes each frame through a detector backend and
//! burns the confident detections into the frame as an overlay (hollow box
//! plus a filled label strip). With no backend loaded every call is a no-op;
//! a backend error is logged and the frame passes through untouched. The
//! overlay never alters pixels outside the drawn marks.

use std::path::Path;

use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use log::warn;

use crate::detect::{Detection, DetectorBackend};
use crate::frame::Frame;

/// Detections at or below this confidence are not drawn.
pub const CONFIDENCE_THRESHOLD: f32 = 0.3;

/// Box outline thickness in pixels.
const BOX_THICKNESS: i32 = 2;

/// Height of the filled label strip drawn above each box.
const LABEL_STRIP_HEIGHT: u32 = 12;

/// Overlay colors, picked per label.
const PALETTE: [Rgb<u8>; 5] = [
    Rgb([0, 220, 80]),
    Rgb([240, 200, 0]),
    Rgb([0, 190, 230]),
    Rgb([230, 80, 200]),
    Rgb([240, 90, 60]),
];

pub struct Annotator {
    backend: Option<Box<dyn DetectorBackend>>,
    threshold: f32,
}

impl Annotator {
    /// Annotator with no model: a permanent, valid no-op.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            threshold: CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_backend(backend: Box<dyn DetectorBackend>) -> Self {
        Self {
            backend: Some(backend),
            threshold: CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Load the configured model, if any.
    ///
    /// A missing path silently disables annotation; a model that fails to
    /// load is logged and likewise disables annotation. Startup never fails
    /// because of the annotation pipeline.
    pub fn from_model_file(
        model_path: Option<&Path>,
        labels_path: Option<&Path>,
        input_size: (u32, u32),
        threshold: f32,
    ) -> Self {
        let Some(model_path) = model_path else {
            return Self::disabled().with_threshold(threshold);
        };

        #[cfg(feature = "backend-tract")]
        {
            let backend = crate::detect::TractBackend::new(model_path, input_size.0, input_size.1)
                .and_then(|backend| match labels_path {
                    Some(labels) => backend.with_labels_file(labels),
                    None => Ok(backend),
                });
            match backend {
                Ok(mut backend) => {
                    if let Err(err) = backend.warm_up() {
                        warn!("model warm-up failed: {err:#}");
                    }
                    log::info!("annotation model loaded from {}", model_path.display());
                    Self::with_backend(Box::new(backend)).with_threshold(threshold)
                }
                Err(err) => {
                    warn!(
                        "failed to load annotation model from {}: {err:#}; annotation disabled",
                        model_path.display()
                    );
                    Self::disabled().with_threshold(threshold)
                }
            }
        }
        #[cfg(not(feature = "backend-tract"))]
        {
            let _ = (labels_path, input_size);
            warn!(
                "annotation model {} configured but this build has no backend-tract feature; \
                 annotation disabled",
                model_path.display()
            );
            Self::disabled().with_threshold(threshold)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Run detection and burn confident detections into the frame.
    ///
    /// Returns the drawn detections so the presentation layer can render
    /// label text over the strips.
    pub fn annotate(&mut self, frame: &mut Frame) -> Vec<Detection> {
        let Some(backend) = self.backend.as_mut() else {
            return Vec::new();
        };

        let detections = match backend.detect(&frame.pixels, frame.width, frame.height) {
            Ok(detections) => detections,
            Err(err) => {
                warn!(
                    "{} detection failed, frame passed through unannotated: {err:#}",
                    backend.name()
                );
                return Vec::new();
            }
        };

        let threshold = self.threshold;
        let drawn: Vec<Detection> = detections
            .into_iter()
            .filter(|det| det.confidence > threshold)
            .collect();

        draw_overlays(frame, &drawn);
        drawn
    }
}

/// Pick a stable palette color for a label.
pub fn label_color(label: &str) -> Rgb<u8> {
    let sum: usize = label.bytes().map(usize::from).sum();
    PALETTE[sum % PALETTE.len()]
}

fn draw_overlays(frame: &mut Frame, detections: &[Detection]) {
    if detections.is_empty() {
        return;
    }
    let (width, height) = (frame.width, frame.height);
    let Some(mut canvas) =
        ImageBuffer::<Rgb<u8>, &mut [u8]>::from_raw(width, height, frame.pixels.as_mut_slice())
    else {
        return;
    };

    for det in detections {
        let (x, y, w, h) = det.bbox.to_pixels(width, height);
        if w == 0 || h == 0 {
            continue;
        }
        let color = label_color(&det.label);

        for t in 0..BOX_THICKNESS {
            let (bw, bh) = (w.saturating_sub(2 * t as u32), h.saturating_sub(2 * t as u32));
            if bw == 0 || bh == 0 {
                break;
            }
            draw_hollow_rect_mut(&mut canvas, Rect::at(x + t, y + t).of_size(bw, bh), color);
        }

        // Label strip above the box, or inside it at the top edge.
        let strip_w = (det.label.len() as u32 * 7 + 6).min(w.max(1));
        let strip_y = if y >= LABEL_STRIP_HEIGHT as i32 {
            y - LABEL_STRIP_HEIGHT as i32
        } else {
            y
        };
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(x, strip_y).of_size(strip_w, LABEL_STRIP_HEIGHT),
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};

    use super::*;
    use crate::detect::BoundingBox;

    struct FixedBackend {
        detections: Vec<Detection>,
    }

    impl DetectorBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<Detection>> {
            Ok(self.detections.clone())
        }
    }

    struct FailingBackend;

    impl DetectorBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&mut self, _pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<Detection>> {
            Err(anyhow!("model exploded"))
        }
    }

    fn test_frame() -> Frame {
        Frame::new(vec![10u8; 64 * 48 * 3], 64, 48).expect("frame")
    }

    fn detection(confidence: f32) -> Detection {
        Detection {
            label: "person".to_string(),
            confidence,
            bbox: BoundingBox {
                x: 0.25,
                y: 0.25,
                w: 0.5,
                h: 0.5,
            },
        }
    }

    #[test]
    fn disabled_annotator_is_identity() {
        let mut frame = test_frame();
        let before = frame.pixels.clone();

        let mut annotator = Annotator::disabled();
        let drawn = annotator.annotate(&mut frame);

        assert!(drawn.is_empty());
        assert_eq!(frame.pixels, before);
    }

    #[test]
    fn low_confidence_detections_are_not_drawn() {
        let mut frame = test_frame();
        let before = frame.pixels.clone();

        let mut annotator =
            Annotator::with_backend(Box::new(FixedBackend {
                detections: vec![detection(0.2)],
            }));
        let drawn = annotator.annotate(&mut frame);

        assert!(drawn.is_empty());
        assert_eq!(frame.pixels, before);
    }

    #[test]
    fn confident_detection_is_burned_into_the_frame() {
        let mut frame = test_frame();
        let before = frame.pixels.clone();

        let mut annotator =
            Annotator::with_backend(Box::new(FixedBackend {
                detections: vec![detection(0.9)],
            }));
        let drawn = annotator.annotate(&mut frame);

        assert_eq!(drawn.len(), 1);
        assert_ne!(frame.pixels, before);
        assert_eq!(frame.pixels.len(), before.len());
    }

    #[test]
    fn backend_error_passes_frame_through() {
        let mut frame = test_frame();
        let before = frame.pixels.clone();

        let mut annotator = Annotator::with_backend(Box::new(FailingBackend));
        let drawn = annotator.annotate(&mut frame);

        assert!(drawn.is_empty());
        assert_eq!(frame.pixels, before);
    }

    #[test]
    fn overlay_stays_inside_the_frame_for_edge_boxes() {
        let mut frame = test_frame();
        let mut annotator = Annotator::with_backend(Box::new(FixedBackend {
            detections: vec![Detection {
                label: "edge".to_string(),
                confidence: 0.9,
                bbox: BoundingBox {
                    x: 0.9,
                    y: -0.2,
                    w: 0.5,
                    h: 0.5,
                },
            }],
        }));

        // Must not panic on clamped, partially out-of-frame boxes.
        let drawn = annotator.annotate(&mut frame);
        assert_eq!(drawn.len(), 1);
    }
}
