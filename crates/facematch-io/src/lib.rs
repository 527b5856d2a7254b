//! facematch-io: frame acquisition and batch import from the filesystem.
//!
//! Stands in for a live camera: stills are read from image files and
//! normalised the way a capture would be. Batch import turns a set of
//! image files (a directory, or entries unpacked from an archive) into
//! gallery enrollments.

pub mod import;
pub mod source;

pub use import::{enroll_all, import_dir, import_entries, import_labeled_tree, ImportError, ImportedImage};
pub use source::{CaptureFormat, FileSequenceSource, StillImageSource};
