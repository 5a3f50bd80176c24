//! Shared fixtures for unit tests: tiny synthetic photos and a detector
//! that derives one face embedding from the top-left pixel color.

use std::path::Path;

use image::{Rgb, RgbImage};

use crate::types::{DetectedFace, DetectorError, Embedding, FaceDetector, FaceLocation};

/// Embedding a [`ColorKeyedDetector`] would produce for a solid `color`.
pub fn color_embedding(color: [u8; 3]) -> Embedding {
    Embedding::new(color.iter().map(|&c| c as f32 / 255.0).collect())
}

/// Write an 8x8 solid-color PNG at `path`.
pub fn write_png(path: &Path, color: [u8; 3]) {
    RgbImage::from_pixel(8, 8, Rgb(color)).save(path).unwrap();
}

/// Deterministic stand-in for the ONNX detector: reports exactly one face
/// spanning the image, embedded as the normalized top-left pixel color.
pub struct ColorKeyedDetector;

impl FaceDetector for ColorKeyedDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError> {
        let Rgb(color) = *image.get_pixel(0, 0);
        Ok(vec![DetectedFace {
            location: FaceLocation {
                top: 0,
                right: image.width() as i32,
                bottom: image.height() as i32,
                left: 0,
            },
            embedding: color_embedding(color),
        }])
    }
}
