//! Best-match selection and accept/reject decision.

use crate::frame::Frame;
use crate::scorer::SimilarityScorer;
use crate::types::{Enrollment, MatchResult};
use serde::Serialize;
use thiserror::Error;

/// Minimum score, exclusive, for a match to be accepted.
pub const DEFAULT_ACCEPT_THRESHOLD: f32 = 65.0;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MatchError {
    #[error("gallery is empty; enroll at least one sample before scanning")]
    EmptyGallery,
}

/// Outcome of one scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Decision {
    Match(MatchResult),
    NoMatch,
}

impl Decision {
    pub fn is_match(&self) -> bool {
        matches!(self, Decision::Match(_))
    }

    pub fn matched(&self) -> Option<&MatchResult> {
        match self {
            Decision::Match(result) => Some(result),
            Decision::NoMatch => None,
        }
    }
}

/// Score `probe` against every enrollment and apply `threshold`.
///
/// The probe's features are computed once and reused. Entries are visited
/// in gallery order and the best score is only replaced by a strictly
/// greater one, so earlier enrollments win ties. The match is accepted only
/// when the best score is strictly above `threshold`.
///
/// Precondition: `gallery` is non-empty. Callers should disable scanning
/// for an empty gallery; this returns [`MatchError::EmptyGallery`] rather
/// than a decision.
pub fn decide(
    scorer: &dyn SimilarityScorer,
    probe: &Frame,
    gallery: &[Enrollment],
    threshold: f32,
) -> Result<Decision, MatchError> {
    if gallery.is_empty() {
        return Err(MatchError::EmptyGallery);
    }

    let probe_features = scorer.features(probe);
    let mut best: Option<(&Enrollment, f32)> = None;

    for enrollment in gallery {
        let score = scorer.compare(&scorer.enrolled_features(enrollment), &probe_features);
        tracing::debug!(
            scorer = scorer.name(),
            id = %enrollment.id(),
            label = enrollment.label(),
            score,
            "scored enrollment"
        );

        let is_better = match best {
            None => true,
            Some((_, best_score)) => score > best_score,
        };
        if is_better {
            best = Some((enrollment, score));
        }
    }

    let decision = match best {
        Some((enrollment, score)) if score > threshold => Decision::Match(MatchResult {
            label: enrollment.label().to_string(),
            score,
            enrollment_id: enrollment.id(),
        }),
        _ => Decision::NoMatch,
    };

    tracing::info!(
        scorer = scorer.name(),
        compared = gallery.len(),
        best_score = best.map(|(_, s)| s).unwrap_or(0.0),
        threshold,
        matched = decision.is_match(),
        "scan decided"
    );

    Ok(decision)
}
