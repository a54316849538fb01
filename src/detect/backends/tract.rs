#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};

/// Tract-based backend for ONNX detection models.
///
/// Loads the model once at startup and pins its input to
/// `1x3x{height}x{width}`. Frames are resampled to the model size with
/// nearest-neighbor lookups while the input tensor is built, so the stream
/// resolution does not have to match the model.
///
/// Expected output layout: one f32 tensor of `[x1, y1, x2, y2, score,
/// class]` rows in model-input pixel coordinates (the common layout of
/// end-to-end exported detectors). Rows with non-finite values are skipped.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    labels: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            labels: Vec::new(),
        })
    }

    /// Attach class labels, one per line of the given file.
    pub fn with_labels_file<P: AsRef<Path>>(mut self, labels_path: P) -> Result<Self> {
        let labels_path = labels_path.as_ref();
        let raw = std::fs::read_to_string(labels_path)
            .with_context(|| format!("failed to read labels from {}", labels_path.display()))?;
        self.labels = raw
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();
        Ok(self)
    }

    fn label_for(&self, class_index: usize) -> String {
        self.labels
            .get(class_index)
            .cloned()
            .unwrap_or_else(|| format!("class {class_index}"))
    }

    /// Build the CHW input tensor, resampling to the model size.
    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let (src_w, src_h) = (width as usize, height as usize);
        let (dst_w, dst_h) = (self.width as usize, self.height as usize);
        let input =
            tract_ndarray::Array4::from_shape_fn((1, 3, dst_h, dst_w), |(_, channel, y, x)| {
                let src_x = (x * src_w / dst_w).min(src_w - 1);
                let src_y = (y * src_h / dst_h).min(src_h - 1);
                let idx = (src_y * src_w + src_x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            });

        Ok(input.into_tensor())
    }

    fn decode_output(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;

        let flat: Vec<f32> = view.iter().copied().collect();
        if !flat.len().is_multiple_of(6) {
            return Err(anyhow!(
                "model output length {} is not divisible into [x1,y1,x2,y2,score,class] rows",
                flat.len()
            ));
        }

        let (model_w, model_h) = (self.width as f32, self.height as f32);
        let mut detections = Vec::new();
        for row in flat.chunks_exact(6) {
            let [x1, y1, x2, y2, score, class] = [row[0], row[1], row[2], row[3], row[4], row[5]];
            if !(x1.is_finite() && y1.is_finite() && x2.is_finite() && y2.is_finite())
                || !score.is_finite()
            {
                continue;
            }
            detections.push(Detection {
                label: self.label_for(class.max(0.0) as usize),
                confidence: score.clamp(0.0, 1.0),
                bbox: BoundingBox {
                    x: x1 / model_w,
                    y: y1 / model_h,
                    w: (x2 - x1).max(0.0) / model_w,
                    h: (y2 - y1).max(0.0) / model_h,
                }
                .clamped(),
            });
        }
        Ok(detections)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_output(outputs)
    }
}
