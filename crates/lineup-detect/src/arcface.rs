//! ArcFace embedding extraction from aligned 112x112 face crops.

use image::RgbImage;
use lineup_core::{DetectorError, Embedding};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

use crate::{build_session, ort_err, Backend};

const INPUT_SIZE: usize = 112;
const MEAN: f32 = 127.5;
const STD: f32 = 127.5; // symmetric normalisation, unlike SCRFD's 128.0
const EMBEDDING_DIM: usize = 512;

pub(crate) struct ArcFace {
    session: Session,
}

impl ArcFace {
    pub fn load(model_path: &Path, backend: Backend) -> Result<Self, DetectorError> {
        let session = build_session(model_path, backend)?;
        tracing::info!(path = %model_path.display(), "ArcFace model loaded");
        Ok(Self { session })
    }

    /// Embed an aligned face crop. The crop must be 112x112, as produced
    /// by [`crate::align::align_face`].
    pub fn embed(&mut self, aligned: &RgbImage) -> Result<Embedding, DetectorError> {
        let tensor = preprocess(aligned);
        let input = TensorRef::from_array_view(tensor.view()).map_err(ort_err)?;
        let outputs = self.session.run(ort::inputs![input]).map_err(ort_err)?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::Inference(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(DetectorError::Inference(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(l2_normalize(raw.to_vec())))
    }
}

/// Convert an aligned RGB crop into the NCHW input tensor.
fn preprocess(aligned: &RgbImage) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    for (x, y, pixel) in aligned.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        if x >= INPUT_SIZE || y >= INPUT_SIZE {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, y, x]] = (pixel[c] as f32 - MEAN) / STD;
        }
    }
    tensor
}

/// Scale a vector to unit length. A zero vector is returned unchanged.
fn l2_normalize(raw: Vec<f32>) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.into_iter().map(|v| v / norm).collect()
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn preprocess_shape() {
        let crop = RgbImage::from_pixel(112, 112, Rgb([128, 64, 200]));
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, INPUT_SIZE, INPUT_SIZE]);
    }

    #[test]
    fn preprocess_normalises_channels_independently() {
        let crop = RgbImage::from_pixel(112, 112, Rgb([255, 0, 128]));
        let tensor = preprocess(&crop);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 0]] - (128.0 - MEAN) / STD).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_unit_length() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector_unchanged() {
        let v = l2_normalize(vec![0.0, 0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
