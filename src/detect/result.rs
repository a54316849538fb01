/// A single detection produced by the external model.
#[derive(Clone, Debug)]
pub struct Detection {
    /// Class label as reported by the model (or a `class N` fallback).
    pub label: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Location in normalized image coordinates.
    pub bbox: BoundingBox,
}

/// Axis-aligned box in normalized [0, 1] image coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    /// Full-frame box.
    pub fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 1.0,
        }
    }

    /// Clamp the box into [0, 1] on both axes.
    pub fn clamped(&self) -> Self {
        let x = self.x.clamp(0.0, 1.0);
        let y = self.y.clamp(0.0, 1.0);
        Self {
            x,
            y,
            w: self.w.clamp(0.0, 1.0 - x),
            h: self.h.clamp(0.0, 1.0 - y),
        }
    }

    /// Map into pixel coordinates for a frame of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> (i32, i32, u32, u32) {
        let clamped = self.clamped();
        let x = (clamped.x * width as f32).round() as i32;
        let y = (clamped.y * height as f32).round() as i32;
        let w = (clamped.w * width as f32).round() as u32;
        let h = (clamped.h * height as f32).round() as u32;
        (x, y, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamping_keeps_boxes_inside_the_frame() {
        let bbox = BoundingBox {
            x: -0.1,
            y: 0.9,
            w: 0.5,
            h: 0.5,
        };
        let clamped = bbox.clamped();
        assert_eq!(clamped.x, 0.0);
        assert!(clamped.x + clamped.w <= 1.0);
        assert!((clamped.y + clamped.h - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn pixel_mapping_scales_by_frame_size() {
        let bbox = BoundingBox {
            x: 0.25,
            y: 0.5,
            w: 0.5,
            h: 0.25,
        };
        assert_eq!(bbox.to_pixels(640, 480), (160, 240, 320, 120));
    }
}
