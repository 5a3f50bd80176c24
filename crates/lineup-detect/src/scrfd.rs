//! SCRFD face detection: letterbox preprocessing, 3-stride anchor-free
//! decoding, and NMS post-processing.

use image::imageops::{self, FilterType};
use image::RgbImage;
use lineup_core::{DetectorError, FaceLocation};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

use crate::{build_session, ort_err, Backend};

const INPUT_SIZE: usize = 640;
const MEAN: f32 = 127.5;
const STD: f32 = 128.0;
const CONFIDENCE_THRESHOLD: f32 = 0.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

/// A detection in source-image coordinates, before clamping.
#[derive(Debug, Clone)]
pub(crate) struct RawFace {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub landmarks: [(f32, f32); 5],
}

impl RawFace {
    /// Clamp to the image and convert to the (top, right, bottom, left)
    /// contract.
    pub fn location(&self, width: u32, height: u32) -> FaceLocation {
        let cx = |v: f32| v.round().clamp(0.0, width as f32) as i32;
        let cy = |v: f32| v.round().clamp(0.0, height as f32) as i32;
        FaceLocation {
            top: cy(self.y1),
            right: cx(self.x2),
            bottom: cy(self.y2),
            left: cx(self.x1),
        }
    }
}

/// De-mapping metadata for the letterbox resize.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn to_image(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

pub(crate) struct Scrfd {
    session: Session,
}

impl Scrfd {
    pub fn load(model_path: &Path, backend: Backend) -> Result<Self, DetectorError> {
        let session = build_session(model_path, backend)?;

        let num_outputs = session.outputs().len();
        if num_outputs < 9 {
            return Err(DetectorError::Inference(format!(
                "SCRFD model requires 9 outputs (3 strides x score/bbox/kps), got {num_outputs}"
            )));
        }
        tracing::info!(path = %model_path.display(), outputs = num_outputs, "SCRFD model loaded");

        Ok(Self { session })
    }

    /// Detect faces in a photo, highest confidence first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawFace>, DetectorError> {
        let (tensor, letterbox) = preprocess(image);
        let input = TensorRef::from_array_view(tensor.view()).map_err(ort_err)?;
        let outputs = self.session.run(ort::inputs![input]).map_err(ort_err)?;

        let mut candidates = Vec::new();
        // Standard SCRFD export layout: [0-2] scores, [3-5] boxes, [6-8]
        // landmarks, each spanning strides 8/16/32.
        for (slot, &stride) in STRIDES.iter().enumerate() {
            let (_, scores) = outputs[slot]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::Inference(format!("scores stride {stride}: {e}")))?;
            let (_, deltas) = outputs[slot + 3]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::Inference(format!("boxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[slot + 6]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::Inference(format!("landmarks stride {stride}: {e}")))?;

            candidates.extend(decode_stride(scores, deltas, kps, stride, &letterbox));
        }

        let mut faces = nms(candidates, NMS_IOU_THRESHOLD);
        faces.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(faces)
    }
}

/// Letterbox a photo into the 640x640 SCRFD input tensor.
///
/// The resize itself goes through `image::imageops` bilinear filtering; a
/// zeroed tensor already equals the normalised pad value, so only the
/// resized region is written.
fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let (width, height) = image.dimensions();
    let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    let pad_x = (INPUT_SIZE as u32 - new_w) / 2;
    let pad_y = (INPUT_SIZE as u32 - new_h) / 2;

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, (y + pad_y) as usize, (x + pad_x) as usize]] =
                (pixel[c] as f32 - MEAN) / STD;
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Decode one stride level into candidate faces in source coordinates.
fn decode_stride(
    scores: &[f32],
    deltas: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<RawFace> {
    let grid = INPUT_SIZE / stride;
    let num_anchors = grid * grid * ANCHORS_PER_CELL;

    let mut faces = Vec::new();
    for idx in 0..num_anchors {
        let confidence = scores.get(idx).copied().unwrap_or(0.0);
        if confidence <= CONFIDENCE_THRESHOLD {
            continue;
        }

        let cell = idx / ANCHORS_PER_CELL;
        let anchor_x = ((cell % grid) * stride) as f32;
        let anchor_y = ((cell / grid) * stride) as f32;

        let b = idx * 4;
        if b + 3 >= deltas.len() {
            continue;
        }
        let (x1, y1) = letterbox.to_image(
            anchor_x - deltas[b] * stride as f32,
            anchor_y - deltas[b + 1] * stride as f32,
        );
        let (x2, y2) = letterbox.to_image(
            anchor_x + deltas[b + 2] * stride as f32,
            anchor_y + deltas[b + 3] * stride as f32,
        );

        // Five landmarks are required downstream for alignment; a
        // truncated tensor disqualifies the candidate.
        let k = idx * 10;
        if k + 9 >= kps.len() {
            continue;
        }
        let mut landmarks = [(0.0f32, 0.0f32); 5];
        for (i, lm) in landmarks.iter_mut().enumerate() {
            *lm = letterbox.to_image(
                anchor_x + kps[k + i * 2] * stride as f32,
                anchor_y + kps[k + i * 2 + 1] * stride as f32,
            );
        }

        faces.push(RawFace {
            x1,
            y1,
            x2,
            y2,
            confidence,
            landmarks,
        });
    }

    faces
}

/// Intersection-over-union of two candidates.
fn iou(a: &RawFace, b: &RawFace) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = inter_w * inter_h;

    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Non-maximum suppression, keeping the highest-confidence candidate of
/// each overlapping cluster.
fn nms(mut candidates: Vec<RawFace>, iou_threshold: f32) -> Vec<RawFace> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawFace> = Vec::new();
    for candidate in candidates {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> RawFace {
        RawFace {
            x1,
            y1,
            x2,
            y2,
            confidence,
            landmarks: [(0.0, 0.0); 5],
        }
    }

    #[test]
    fn iou_identical_is_one() {
        let a = face(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_disjoint_is_zero() {
        let a = face(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = face(20.0, 20.0, 30.0, 30.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn iou_half_overlap() {
        let a = face(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = face(5.0, 0.0, 15.0, 10.0, 1.0);
        // intersection 50, union 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn nms_keeps_best_of_cluster() {
        let candidates = vec![
            face(0.0, 0.0, 100.0, 100.0, 0.9),
            face(5.0, 5.0, 105.0, 105.0, 0.8),
            face(200.0, 200.0, 250.0, 250.0, 0.7),
        ];
        let kept = nms(candidates, 0.4);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn nms_empty_input() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn letterbox_round_trip() {
        let lb = Letterbox {
            scale: 2.0,
            pad_x: 0.0,
            pad_y: 160.0,
        };
        // A 320x240 photo scaled by 2 and padded vertically.
        let (x, y) = lb.to_image(100.0 * 2.0, 50.0 * 2.0 + 160.0);
        assert!((x - 100.0).abs() < 1e-4);
        assert!((y - 50.0).abs() < 1e-4);
    }

    #[test]
    fn preprocess_shape_and_padding() {
        let image = RgbImage::from_pixel(320, 240, Rgb([255, 255, 255]));
        let (tensor, lb) = preprocess(&image);

        assert_eq!(tensor.shape(), &[1, 3, INPUT_SIZE, INPUT_SIZE]);
        assert!((lb.scale - 2.0).abs() < 1e-6);
        assert!((lb.pad_x - 0.0).abs() < 1e-6);
        assert!((lb.pad_y - 80.0).abs() < 1e-6);

        // Pad rows stay at the normalised pad value (0.0), content is white.
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        let white = (255.0 - MEAN) / STD;
        assert!((tensor[[0, 0, 240, 320]] - white).abs() < 1e-6);
    }

    #[test]
    fn decode_stride_places_box_around_anchor() {
        let stride = 32;
        let grid = INPUT_SIZE / stride;
        let num_anchors = grid * grid * ANCHORS_PER_CELL;

        let mut scores = vec![0.0f32; num_anchors];
        let deltas = vec![1.0f32; num_anchors * 4];
        let kps = vec![0.5f32; num_anchors * 10];

        // One confident anchor in the second cell of the first row.
        let idx = 2; // cell 1, anchor 0
        scores[idx] = 0.9;

        let identity = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let faces = decode_stride(&scores, &deltas, &kps, stride, &identity);

        assert_eq!(faces.len(), 1);
        let f = &faces[0];
        // Anchor center (32, 0); deltas of 1.0 expand by one stride.
        assert!((f.x1 - 0.0).abs() < 1e-4);
        assert!((f.y1 + 32.0).abs() < 1e-4);
        assert!((f.x2 - 64.0).abs() < 1e-4);
        assert!((f.y2 - 32.0).abs() < 1e-4);
        // Landmarks offset by 0.5 strides from the anchor.
        assert!((f.landmarks[0].0 - 48.0).abs() < 1e-4);
        assert!((f.landmarks[0].1 - 16.0).abs() < 1e-4);
    }

    #[test]
    fn location_clamps_to_image() {
        let f = face(-10.0, -5.0, 700.0, 500.0, 0.9);
        let loc = f.location(640, 480);
        assert_eq!(loc.left, 0);
        assert_eq!(loc.top, 0);
        assert_eq!(loc.right, 640);
        assert_eq!(loc.bottom, 480);
    }
}
