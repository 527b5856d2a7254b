//! Similarity scoring backends.
//!
//! Both backends map a pair of stills to a score in [0, 100], where 100
//! means identical. A backend is chosen once at startup and used through
//! the [`SimilarityScorer`] trait object; the matcher never branches on it.

use crate::extractor::FeatureExtractor;
use crate::frame::Frame;
use crate::types::{Enrollment, Representation};
use std::sync::Arc;

// --- Named constants (reference tuning, no documented derivation) ---
/// Side length of the luma grid both stills are downsampled to.
pub const PIXEL_GRID_SIZE: u32 = 24;
/// Score points lost per unit of mean absolute luma deviation.
pub const PIXEL_SENSITIVITY: f32 = 1.6;
/// Euclidean descriptor distance at which the score reaches 0.
pub const DESCRIPTOR_DISTANCE_BUDGET: f32 = 0.8;

pub const MAX_SCORE: f32 = 100.0;

/// Per-still features a backend compares.
#[derive(Debug, Clone, PartialEq)]
pub enum Features {
    /// Downsampled luma grid, row-major.
    Luma(Vec<f32>),
    /// Extracted descriptor; `None` when no usable face was found.
    Descriptor(Option<Representation>),
}

/// Strategy for scoring two face stills.
///
/// Implementations are pure: the same pixels always produce the same score,
/// and no input pair makes them fail. Splitting feature computation from
/// comparison lets the matcher prepare the probe once per scan.
pub trait SimilarityScorer: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Compute the features of a still.
    fn features(&self, frame: &Frame) -> Features;

    /// Features of an enrolled sample. Backends with a cacheable
    /// representation override this to use the enrollment's cache.
    fn enrolled_features(&self, enrollment: &Enrollment) -> Features {
        self.features(enrollment.frame())
    }

    /// Compare two feature sets. Symmetric, always in [0, 100].
    fn compare(&self, a: &Features, b: &Features) -> f32;

    /// Score two stills.
    fn score(&self, a: &Frame, b: &Frame) -> f32 {
        self.compare(&self.features(a), &self.features(b))
    }
}

/// Mean-absolute-luma-deviation scorer. Needs no model.
#[derive(Debug, Clone)]
pub struct PixelDeviationScorer {
    grid_size: u32,
    sensitivity: f32,
}

impl PixelDeviationScorer {
    pub fn new(grid_size: u32, sensitivity: f32) -> Self {
        Self {
            grid_size,
            sensitivity,
        }
    }
}

impl Default for PixelDeviationScorer {
    fn default() -> Self {
        Self::new(PIXEL_GRID_SIZE, PIXEL_SENSITIVITY)
    }
}

impl SimilarityScorer for PixelDeviationScorer {
    fn name(&self) -> &'static str {
        "pixel"
    }

    fn features(&self, frame: &Frame) -> Features {
        Features::Luma(frame.luma_grid(self.grid_size))
    }

    fn compare(&self, a: &Features, b: &Features) -> f32 {
        let (Features::Luma(a), Features::Luma(b)) = (a, b) else {
            tracing::debug!(scorer = self.name(), "feature kind mismatch; scoring 0");
            return 0.0;
        };
        if a.is_empty() || a.len() != b.len() {
            return 0.0;
        }

        let total: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum();
        let mean_deviation = total / a.len() as f32;
        bounded(MAX_SCORE - mean_deviation * self.sensitivity)
    }
}

/// Descriptor-distance scorer backed by a [`FeatureExtractor`].
///
/// Fails closed: if either still has no usable face the pair scores 0.
pub struct DescriptorDistanceScorer {
    extractor: Arc<dyn FeatureExtractor>,
    distance_budget: f32,
}

impl DescriptorDistanceScorer {
    pub fn new(extractor: Arc<dyn FeatureExtractor>, distance_budget: f32) -> Self {
        Self {
            extractor,
            distance_budget,
        }
    }

    pub fn with_default_budget(extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self::new(extractor, DESCRIPTOR_DISTANCE_BUDGET)
    }
}

impl SimilarityScorer for DescriptorDistanceScorer {
    fn name(&self) -> &'static str {
        "descriptor"
    }

    fn features(&self, frame: &Frame) -> Features {
        Features::Descriptor(self.extractor.extract(frame))
    }

    fn enrolled_features(&self, enrollment: &Enrollment) -> Features {
        let representation =
            enrollment.representation_or_extract(|frame| self.extractor.extract(frame));
        if representation.is_none() {
            tracing::debug!(id = %enrollment.id(), label = enrollment.label(), "no face in enrolled sample");
        }
        Features::Descriptor(representation.clone())
    }

    fn compare(&self, a: &Features, b: &Features) -> f32 {
        let (Features::Descriptor(Some(a)), Features::Descriptor(Some(b))) = (a, b) else {
            return 0.0;
        };
        if a.dim() == 0 || a.dim() != b.dim() || self.distance_budget <= 0.0 {
            return 0.0;
        }

        let distance = a.euclidean_distance(b);
        bounded(MAX_SCORE * (1.0 - distance / self.distance_budget))
    }
}

/// Clamp to [0, 100]; non-finite values score 0.
fn bounded(score: f32) -> f32 {
    if score.is_finite() {
        score.clamp(0.0, MAX_SCORE)
    } else {
        0.0
    }
}
