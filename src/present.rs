//! Display-agnostic presentation pieces: the command alphabet the viewer
//! polls for, and snapshot writing.
//!
//! The windowing layer (the viewer binary) maps key presses to `Command`
//! values and applies them; everything here is testable without a window.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{ExtendedColorType, ImageFormat};

use crate::frame::Frame;

/// Default window size, restored by `ResetWindow`.
pub const DEFAULT_WINDOW_WIDTH: u32 = 1280;
pub const DEFAULT_WINDOW_HEIGHT: u32 = 720;

/// The viewer's fixed command alphabet. Absence of input is simply "no
/// command this tick", not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    ToggleFullscreen,
    ResetWindow,
    SaveSnapshot,
}

impl Command {
    /// Single-key bindings: `q`, `f`, `r`, `s`.
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'q' => Some(Command::Quit),
            'f' => Some(Command::ToggleFullscreen),
            'r' => Some(Command::ResetWindow),
            's' => Some(Command::SaveSnapshot),
            _ => None,
        }
    }
}

/// Writes sequentially numbered JPEG snapshots into one directory.
///
/// Numbering starts at 1 and is gapless within a session: the counter only
/// advances when a file was actually written.
pub struct SnapshotWriter {
    dir: PathBuf,
    next: u32,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next: 1,
        }
    }

    /// Save the frame verbatim (including any burned-in overlay).
    pub fn save(&mut self, frame: &Frame) -> Result<PathBuf> {
        let path = self.dir.join(format!("snapshot_{:03}.jpg", self.next));
        write_jpeg(frame, &path)?;
        self.next += 1;
        Ok(path)
    }

    /// Number the next snapshot will get.
    pub fn next_index(&self) -> u32 {
        self.next
    }
}

fn write_jpeg(frame: &Frame, path: &Path) -> Result<()> {
    image::save_buffer_with_format(
        path,
        &frame.pixels,
        frame.width,
        frame.height,
        ExtendedColorType::Rgb8,
        ImageFormat::Jpeg,
    )
    .with_context(|| format!("failed to write snapshot {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_bindings_map_to_commands() {
        assert_eq!(Command::from_key('q'), Some(Command::Quit));
        assert_eq!(Command::from_key('F'), Some(Command::ToggleFullscreen));
        assert_eq!(Command::from_key('r'), Some(Command::ResetWindow));
        assert_eq!(Command::from_key('s'), Some(Command::SaveSnapshot));
        assert_eq!(Command::from_key('x'), None);
        assert_eq!(Command::from_key(' '), None);
    }

    #[test]
    fn snapshots_are_numbered_sequentially_from_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut writer = SnapshotWriter::new(dir.path());
        let frame = Frame::new(vec![128u8; 16 * 16 * 3], 16, 16).expect("frame");

        let first = writer.save(&frame).expect("first snapshot");
        let second = writer.save(&frame).expect("second snapshot");

        assert!(first.ends_with("snapshot_001.jpg"));
        assert!(second.ends_with("snapshot_002.jpg"));
        assert!(first.exists());
        assert!(second.exists());
        assert_eq!(writer.next_index(), 3);
    }

    #[test]
    fn failed_save_does_not_advance_the_counter() {
        let mut writer = SnapshotWriter::new("/nonexistent/deeply/missing");
        let frame = Frame::new(vec![0u8; 3], 1, 1).expect("frame");

        assert!(writer.save(&frame).is_err());
        assert_eq!(writer.next_index(), 1);
    }
}
