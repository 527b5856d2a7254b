//! Batch import of labelled face images.
//!
//! Only jpg, jpeg, png and webp files are considered; anything else is
//! skipped silently. Files that look like images but fail to decode are
//! skipped with a warning, as are files or identity directories that
//! cannot be read. Only a total absence of usable images is an error.
//!
//! Imported stills get the same [`CaptureFormat`] normalisation as live
//! captures, so a probe taken from an enrolled file scores as identical.

use crate::source::CaptureFormat;
use facematch_core::{EnrollmentId, Frame, Gallery, GalleryError};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no valid images found")]
    NoUsableImages,
}

/// One decoded image ready to enroll.
#[derive(Debug, Clone)]
pub struct ImportedImage {
    pub label: String,
    /// File name or archive path the image came from.
    pub name: String,
    pub frame: Frame,
}

/// True when the path has one of the supported image extensions (any case).
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Decode `(name, bytes)` entries, e.g. unpacked from an archive, under one label.
///
/// Directory entries (names ending in `/`) and unsupported extensions are skipped.
pub fn import_entries<I, N, B>(
    label: &str,
    entries: I,
    format: CaptureFormat,
) -> Result<Vec<ImportedImage>, ImportError>
where
    I: IntoIterator<Item = (N, B)>,
    N: AsRef<str>,
    B: AsRef<[u8]>,
{
    let images = decode_entries(label, entries, format);
    if images.is_empty() {
        return Err(ImportError::NoUsableImages);
    }
    Ok(images)
}

/// Import every supported image directly inside `dir` under one label.
pub fn import_dir(dir: &Path, label: &str, format: CaptureFormat) -> Result<Vec<ImportedImage>, ImportError> {
    let images = decode_entries(label, read_dir_files(dir)?, format);
    if images.is_empty() {
        return Err(ImportError::NoUsableImages);
    }
    Ok(images)
}

/// Import a tree where each sub-directory of `root` is one identity, named
/// after the directory. Identities come out in directory-name order.
///
/// Only an unreadable `root` is an error; unreadable identity directories
/// are skipped.
pub fn import_labeled_tree(root: &Path, format: CaptureFormat) -> Result<Vec<ImportedImage>, ImportError> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)
        .map_err(|source| ImportError::Io {
            path: root.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    let mut images = Vec::new();
    for dir in dirs {
        let Some(label) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            tracing::warn!(dir = %dir.display(), "skipping directory with non UTF-8 name");
            continue;
        };
        let files = match read_dir_files(&dir) {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable identity directory");
                continue;
            }
        };
        let found = decode_entries(&label, files, format);
        tracing::debug!(label = %label, images = found.len(), "imported identity directory");
        images.extend(found);
    }

    if images.is_empty() {
        return Err(ImportError::NoUsableImages);
    }
    tracing::info!(root = %root.display(), images = images.len(), "imported labelled tree");
    Ok(images)
}

/// Enroll imported images one at a time, in order.
pub fn enroll_all(
    gallery: &mut Gallery,
    images: Vec<ImportedImage>,
) -> Result<Vec<EnrollmentId>, GalleryError> {
    images
        .into_iter()
        .map(|image| gallery.enroll(&image.label, image.frame))
        .collect()
}

fn decode_entries<I, N, B>(label: &str, entries: I, format: CaptureFormat) -> Vec<ImportedImage>
where
    I: IntoIterator<Item = (N, B)>,
    N: AsRef<str>,
    B: AsRef<[u8]>,
{
    let mut images = Vec::new();
    for (name, bytes) in entries {
        let name = name.as_ref();
        if name.ends_with('/') || !is_supported_image(Path::new(name)) {
            continue;
        }
        match Frame::decode(bytes.as_ref()) {
            Ok(frame) => images.push(ImportedImage {
                label: label.to_string(),
                name: name.to_string(),
                frame: frame.normalized(format.size, format.mirror),
            }),
            Err(err) => tracing::warn!(name, error = %err, "skipping undecodable image"),
        }
    }
    images
}

/// Read the non-directory entries directly inside `dir` as
/// `(file name, bytes)`, in file-name order. Unsupported files are not
/// read; files that fail to read are skipped with a warning.
fn read_dir_files(dir: &Path) -> Result<Vec<(String, Vec<u8>)>, ImportError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|source| ImportError::Io {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| !t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|p| is_supported_image(p))
        .collect();
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable image");
                continue;
            }
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        files.push((name, bytes));
    }
    Ok(files)
}
