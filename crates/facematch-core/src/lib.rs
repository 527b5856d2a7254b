//! facematch-core: identity matching engine for enrolled face stills.
//!
//! Holds the enrolled gallery, scores probe frames against it with a
//! pluggable similarity backend (pixel deviation or ArcFace descriptors
//! via ONNX Runtime) and renders thresholded accept/reject decisions.

pub mod capture;
pub mod extractor;
pub mod frame;
pub mod gallery;
pub mod matcher;
pub mod scorer;
pub mod source;
pub mod types;

pub use capture::{BatchCaptureController, CaptureEffect, CaptureEvent, CaptureState, CaptureTiming};
pub use extractor::{ArcFaceExtractor, FeatureExtractor};
pub use frame::Frame;
pub use gallery::{Gallery, GalleryError, IdentityGroup};
pub use matcher::{decide, Decision, MatchError, DEFAULT_ACCEPT_THRESHOLD};
pub use scorer::{DescriptorDistanceScorer, Features, PixelDeviationScorer, SimilarityScorer};
pub use source::{FrameSource, SourceError};
pub use types::{Enrollment, EnrollmentId, MatchResult, Representation};
