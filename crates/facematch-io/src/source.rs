//! File-backed frame sources.

use crate::import::is_supported_image;
use facematch_core::frame::CAPTURE_SIZE;
use facematch_core::{Frame, FrameSource, SourceError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// How raw stills are normalised into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    /// Output side length; frames are square.
    pub size: u32,
    /// Flip horizontally (selfie view).
    pub mirror: bool,
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self {
            size: CAPTURE_SIZE,
            mirror: true,
        }
    }
}

/// Re-reads one image file on every capture.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    path: PathBuf,
    format: CaptureFormat,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>, format: CaptureFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

impl FrameSource for StillImageSource {
    fn capture(&mut self) -> Result<Frame, SourceError> {
        read_frame(&self.path, self.format)
    }
}

/// Cycles through a fixed list of image files, one per capture.
#[derive(Debug, Clone)]
pub struct FileSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
    format: CaptureFormat,
}

impl FileSequenceSource {
    pub fn new(paths: Vec<PathBuf>, format: CaptureFormat) -> Self {
        Self {
            paths,
            next: 0,
            format,
        }
    }

    /// All supported images directly inside `dir`, in file-name order.
    pub fn from_dir(dir: &Path, format: CaptureFormat) -> Result<Self, SourceError> {
        let entries = std::fs::read_dir(dir).map_err(|e| unavailable(dir, &e))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_supported_image(p))
            .collect();
        paths.sort();
        tracing::debug!(dir = %dir.display(), frames = paths.len(), "opened frame sequence");
        Ok(Self::new(paths, format))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for FileSequenceSource {
    fn capture(&mut self) -> Result<Frame, SourceError> {
        if self.paths.is_empty() {
            return Err(SourceError::Unavailable("frame sequence is empty".into()));
        }
        let path = &self.paths[self.next % self.paths.len()];
        self.next = self.next.wrapping_add(1);
        read_frame(path, self.format)
    }
}

fn read_frame(path: &Path, format: CaptureFormat) -> Result<Frame, SourceError> {
    let bytes = std::fs::read(path).map_err(|e| unavailable(path, &e))?;
    let raw = image::load_from_memory(&bytes)
        .map_err(|e| SourceError::NoFrame(format!("{}: {e}", path.display())))?;
    Ok(Frame::from_capture(&raw, format.size, format.mirror))
}

fn unavailable(path: &Path, err: &std::io::Error) -> SourceError {
    let message = match err.kind() {
        ErrorKind::PermissionDenied => {
            format!("Unable to access {}. Please check permissions.", path.display())
        }
        ErrorKind::NotFound => format!("{} not found", path.display()),
        _ => format!("{}: {err}", path.display()),
    };
    SourceError::Unavailable(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn write_png(dir: &Path, name: &str, value: u8) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(20, 10, Rgba([value, value, value, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_still_source_normalises_capture() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "face.png", 90);
        let mut source = StillImageSource::new(path, CaptureFormat::default());

        let frame = source.capture().unwrap();
        assert_eq!((frame.width(), frame.height()), (CAPTURE_SIZE, CAPTURE_SIZE));
        assert!((frame.avg_brightness() - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let mut source = StillImageSource::new("/nonexistent/face.png", CaptureFormat::default());
        assert!(matches!(source.capture(), Err(SourceError::Unavailable(_))));
    }

    #[test]
    fn test_corrupt_file_is_no_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        let mut source = StillImageSource::new(path, CaptureFormat::default());
        assert!(matches!(source.capture(), Err(SourceError::NoFrame(_))));
    }

    #[test]
    fn test_sequence_cycles_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "b.png", 200);
        write_png(dir.path(), "a.png", 50);
        std::fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();

        let format = CaptureFormat { size: 8, mirror: false };
        let mut source = FileSequenceSource::from_dir(dir.path(), format).unwrap();
        assert_eq!(source.len(), 2);

        let brightness: Vec<f32> = (0..3)
            .map(|_| source.capture().unwrap().avg_brightness())
            .collect();
        assert!((brightness[0] - 50.0).abs() < 1e-3);
        assert!((brightness[1] - 200.0).abs() < 1e-3);
        assert!((brightness[2] - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_empty_sequence_unavailable() {
        let mut source = FileSequenceSource::new(Vec::new(), CaptureFormat::default());
        assert!(matches!(source.capture(), Err(SourceError::Unavailable(_))));
    }
}
