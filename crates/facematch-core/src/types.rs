use crate::frame::Frame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Gallery-assigned enrollment identifier, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnrollmentId(pub u64);

impl fmt::Display for EnrollmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed-length face descriptor (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representation {
    pub values: Vec<f32>,
    /// Model version that produced this descriptor (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Representation {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two descriptors.
    pub fn euclidean_distance(&self, other: &Representation) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One enrolled face sample.
///
/// The descriptor cache is shared between clones, so a scan over a gallery
/// snapshot fills the cache of the live enrollment too. Once set it is never
/// recomputed, including when extraction found no face.
#[derive(Debug, Clone)]
pub struct Enrollment {
    id: EnrollmentId,
    label: String,
    frame: Frame,
    enrolled_at: DateTime<Utc>,
    representation: Arc<OnceLock<Option<Representation>>>,
}

impl Enrollment {
    /// Surrounding whitespace is trimmed from `label`.
    pub fn new(id: EnrollmentId, label: impl Into<String>, frame: Frame) -> Self {
        let label: String = label.into();
        Self {
            id,
            label: label.trim().to_string(),
            frame,
            enrolled_at: Utc::now(),
            representation: Arc::new(OnceLock::new()),
        }
    }

    pub fn id(&self) -> EnrollmentId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn enrolled_at(&self) -> DateTime<Utc> {
        self.enrolled_at
    }

    /// Cached descriptor, if extraction has run. `Some(None)` means it ran
    /// and found no usable face.
    pub fn cached_representation(&self) -> Option<&Option<Representation>> {
        self.representation.get()
    }

    /// Return the cached descriptor, running `extract` on first use only.
    pub fn representation_or_extract<F>(&self, extract: F) -> &Option<Representation>
    where
        F: FnOnce(&Frame) -> Option<Representation>,
    {
        self.representation.get_or_init(|| extract(&self.frame))
    }
}

/// Accepted match: the best-scoring identity and its score in [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub label: String,
    pub score: f32,
    /// Enrollment that produced the best score.
    pub enrollment_id: EnrollmentId,
}
