//! Decoded video frames.
//!
//! A `Frame` is a decoded RGB8 image buffer plus its capture instant and a
//! per-session sequence number. Frames move by ownership through the
//! pipeline (source → session → annotator → presentation); each stage either
//! consumes-and-drops or consumes-and-forwards, so no stage can accumulate
//! an unbounded backlog.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

/// Bytes per pixel for the RGB8 layout every source produces.
pub const BYTES_PER_PIXEL: usize = 3;

/// A decoded RGB8 frame.
///
/// Rows are tightly packed (`width * 3` bytes, no stride padding); sources
/// are responsible for de-striding before constructing a `Frame`.
pub struct Frame {
    /// Packed RGB8 pixel data, row-major.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic capture instant, used for staleness accounting.
    pub captured_at: Instant,
    /// Session-assigned sequence number; 0 until the session delivers it.
    pub seq: u64,
}

impl Frame {
    /// Build a frame, validating that the buffer matches the dimensions.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
            .ok_or_else(|| anyhow!("frame dimensions {}x{} overflow", width, height))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            captured_at: Instant::now(),
            seq: 0,
        })
    }

    /// Time elapsed since this frame was decoded.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}
