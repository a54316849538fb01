use anyhow::Result;

use crate::detect::result::Detection;

/// Detector backend trait.
///
/// The annotation pipeline treats the model as an opaque classifier behind
/// this seam: it is loaded once at startup, read-only afterwards, and its
/// absence is a permanent, valid state rather than a per-frame error.
/// Tests substitute fixed-result fakes.
///
/// `detect` runs synchronously in the render path, so implementations must
/// have bounded per-frame cost; a slow backend lowers the displayed frame
/// rate but must not block indefinitely.
pub trait DetectorBackend: Send {
    /// Backend identifier for logs.
    fn name(&self) -> &'static str;

    /// Run detection on a packed RGB8 frame.
    ///
    /// The pixel slice is read-only and ephemeral; implementations must not
    /// retain it past the call.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, called once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
