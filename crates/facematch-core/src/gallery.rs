//! Enrolled gallery, grouped by identity label.

use crate::frame::Frame;
use crate::types::{Enrollment, EnrollmentId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GalleryError {
    #[error("identity label must not be empty")]
    EmptyLabel,
    #[error("enrollment id {0} is already in the gallery")]
    DuplicateId(EnrollmentId),
    #[error("no enrollment ids left to assign")]
    IdsExhausted,
}

/// Insertion-ordered collection of enrollments.
///
/// Several enrollments may share a label (multi-sample enrollment); ids are
/// unique. Per-label grouping is always derived from the live list.
#[derive(Debug)]
pub struct Gallery {
    entries: Vec<Enrollment>,
    /// `None` once the id space is used up.
    next_id: Option<u64>,
}

impl Default for Gallery {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: Some(0),
        }
    }
}

/// Read-only view of one identity: its label and samples in insertion order.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityGroup<'a> {
    pub label: &'a str,
    pub count: usize,
    /// Enrollment time of the identity's oldest sample.
    pub first_enrolled_at: DateTime<Utc>,
    #[serde(skip)]
    pub enrollments: Vec<&'a Enrollment>,
    pub ids: Vec<EnrollmentId>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll one sample under `label`, assigning a fresh id.
    pub fn enroll(&mut self, label: &str, frame: Frame) -> Result<EnrollmentId, GalleryError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(GalleryError::EmptyLabel);
        }
        let id = self.allocate_id()?;
        self.entries.push(Enrollment::new(id, label, frame));
        tracing::info!(id = %id, label, samples = self.entries.len(), "enrolled sample");
        Ok(id)
    }

    /// Enroll a batch of samples under one label. Returns the new ids in order.
    pub fn enroll_batch<I>(&mut self, label: &str, frames: I) -> Result<Vec<EnrollmentId>, GalleryError>
    where
        I: IntoIterator<Item = Frame>,
    {
        if label.trim().is_empty() {
            return Err(GalleryError::EmptyLabel);
        }
        frames
            .into_iter()
            .map(|frame| self.enroll(label, frame))
            .collect()
    }

    /// Insert an enrollment built elsewhere. Rejects duplicate ids and empty labels.
    ///
    /// Adding the largest possible id is allowed, but later `enroll` calls
    /// then fail with [`GalleryError::IdsExhausted`].
    pub fn add(&mut self, enrollment: Enrollment) -> Result<(), GalleryError> {
        if enrollment.label().is_empty() {
            return Err(GalleryError::EmptyLabel);
        }
        if self.entries.iter().any(|e| e.id() == enrollment.id()) {
            return Err(GalleryError::DuplicateId(enrollment.id()));
        }
        self.next_id = match (self.next_id, enrollment.id().0.checked_add(1)) {
            (Some(next), Some(after)) => Some(next.max(after)),
            _ => None,
        };
        self.entries.push(enrollment);
        Ok(())
    }

    /// Remove every enrollment carrying `label`. Returns how many were removed.
    ///
    /// Deleting one sample deletes the whole identity.
    pub fn remove_by_label(&mut self, label: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.label() != label);
        let removed = before - self.entries.len();
        tracing::info!(label, removed, remaining = self.entries.len(), "removed identity");
        removed
    }

    /// Group enrollments by label, labels in first-seen order.
    pub fn grouped_by_label(&self) -> Vec<IdentityGroup<'_>> {
        let mut groups: Vec<IdentityGroup<'_>> = Vec::new();
        for enrollment in &self.entries {
            match groups.iter_mut().find(|g| g.label == enrollment.label()) {
                Some(group) => {
                    group.count += 1;
                    group.first_enrolled_at = group.first_enrolled_at.min(enrollment.enrolled_at());
                    group.enrollments.push(enrollment);
                    group.ids.push(enrollment.id());
                }
                None => groups.push(IdentityGroup {
                    label: enrollment.label(),
                    count: 1,
                    first_enrolled_at: enrollment.enrolled_at(),
                    enrollments: vec![enrollment],
                    ids: vec![enrollment.id()],
                }),
            }
        }
        groups
    }

    /// All enrollments in insertion order.
    pub fn all(&self) -> impl Iterator<Item = &Enrollment> {
        self.entries.iter()
    }

    pub fn get(&self, id: EnrollmentId) -> Option<&Enrollment> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of distinct labels.
    pub fn identity_count(&self) -> usize {
        self.grouped_by_label().len()
    }

    /// Copy of the current entries for a scan. Frames and descriptor caches
    /// are shared, so this is cheap and later mutation cannot disturb it.
    pub fn snapshot(&self) -> Vec<Enrollment> {
        self.entries.clone()
    }

    /// Remove everything. Ids keep increasing afterwards.
    pub fn clear(&mut self) {
        tracing::info!(removed = self.entries.len(), "gallery cleared");
        self.entries.clear();
    }

    fn allocate_id(&mut self) -> Result<EnrollmentId, GalleryError> {
        let id = self.next_id.ok_or(GalleryError::IdsExhausted)?;
        self.next_id = id.checked_add(1);
        Ok(EnrollmentId(id))
    }
}
