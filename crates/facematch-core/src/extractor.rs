//! Face descriptor extraction.
//!
//! [`FeatureExtractor`] is the pluggable boundary; [`ArcFaceExtractor`] is
//! the ONNX Runtime backend using the w600k_r50 ArcFace model. Frames are
//! expected to be face stills already framed by the capture step, so the
//! whole frame is treated as the face crop.

use crate::frame::Frame;
use crate::types::Representation;
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

// --- Named constants ---
const ARCFACE_INPUT_SIZE: usize = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, not 128.0
const ARCFACE_EMBEDDING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

/// Turns one face still into a fixed-length descriptor.
///
/// `None` means no usable face was found. It is a normal outcome, not an
/// error, and implementations must not panic on well-formed frames.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, frame: &Frame) -> Option<Representation>;
}

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("model file not found: {0} (download w600k_r50.onnx from insightface)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("session lock poisoned")]
    Poisoned,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based descriptor extractor.
pub struct ArcFaceExtractor {
    session: Mutex<Session>,
}

impl ArcFaceExtractor {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ExtractorError> {
        if !model_path.exists() {
            return Err(ExtractorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Run the model on a frame and return the L2-normalised descriptor.
    pub fn infer(&self, frame: &Frame) -> Result<Representation, ExtractorError> {
        let input = Self::preprocess(frame);

        let mut session = self.session.lock().map_err(|_| ExtractorError::Poisoned)?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractorError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(ExtractorError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        let mut values = raw;
        l2_normalize(&mut values);

        Ok(Representation {
            values,
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }

    /// Resize the frame to 112x112 and lay it out as a normalised NCHW RGB tensor.
    fn preprocess(frame: &Frame) -> Array4<f32> {
        let size = ARCFACE_INPUT_SIZE;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        if frame.is_empty() {
            return tensor;
        }

        let resized = imageops::resize(frame.image(), size as u32, size as u32, FilterType::Triangle);
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (pixel.0[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
            }
        }

        tensor
    }
}

impl FeatureExtractor for ArcFaceExtractor {
    fn extract(&self, frame: &Frame) -> Option<Representation> {
        if frame.is_empty() || frame.is_dark() {
            tracing::debug!(
                brightness = frame.avg_brightness(),
                "frame too dark for a usable face"
            );
            return None;
        }

        match self.infer(frame) {
            Ok(representation) => Some(representation),
            Err(err) => {
                tracing::warn!(error = %err, "descriptor extraction failed; treating as no face");
                None
            }
        }
    }
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_preprocess_output_shape() {
        let frame = Frame::new(RgbaImage::from_pixel(160, 160, Rgba([128, 128, 128, 255])));
        let tensor = ArcFaceExtractor::preprocess(&frame);
        assert_eq!(tensor.shape(), &[1, 3, ARCFACE_INPUT_SIZE, ARCFACE_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let frame = Frame::new(RgbaImage::from_pixel(50, 50, Rgba([255, 128, 0, 255])));
        let tensor = ArcFaceExtractor::preprocess(&frame);
        assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < 1e-6);
        let expected_g = (128.0 - ARCFACE_MEAN) / ARCFACE_STD;
        assert!((tensor[[0, 1, 10, 10]] - expected_g).abs() < 1e-6);
        assert!((tensor[[0, 2, 10, 10]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_empty_frame_is_zero() {
        let frame = Frame::new(RgbaImage::new(0, 0));
        let tensor = ArcFaceExtractor::preprocess(&frame);
        assert!(tensor.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_load_missing_model() {
        let result = ArcFaceExtractor::load(Path::new("/nonexistent/w600k_r50.onnx"));
        assert!(matches!(result, Err(ExtractorError::ModelNotFound(_))));
    }

    #[test]
    fn test_l2_normalize_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
