use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pixel rectangle delimiting a detected face, in source-image coordinates.
///
/// Edges follow the (top, right, bottom, left) convention used by the
/// detector contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceLocation {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Whether `other` is within `tolerance` distance of this embedding.
    pub fn is_match(&self, other: &Embedding, tolerance: f32) -> bool {
        self.euclidean_distance(other) <= tolerance
    }
}

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("identity label is empty")]
    Empty,
    #[error("identity label {0:?} contains a path separator")]
    PathSeparator(String),
    #[error("identity label {0:?} contains a NUL byte")]
    Nul(String),
}

/// Validated identity name, derived from a training sub-directory.
///
/// Non-empty and free of path separators, so a label can never escape the
/// training root it names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityLabel(String);

impl IdentityLabel {
    pub fn new(name: impl Into<String>) -> Result<Self, LabelError> {
        let name = name.into();
        if name.is_empty() {
            return Err(LabelError::Empty);
        }
        if name.contains('/') || name.contains('\\') {
            return Err(LabelError::PathSeparator(name));
        }
        if name.contains('\0') {
            return Err(LabelError::Nul(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdentityLabel {
    type Error = LabelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IdentityLabel> for String {
    fn from(label: IdentityLabel) -> Self {
        label.0
    }
}

impl AsRef<str> for IdentityLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sentinel shown for a face that matched nothing in the gallery.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Per-face outcome of a recognition pass: where the face is and who it is,
/// if anyone.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub location: FaceLocation,
    pub identity: Option<IdentityLabel>,
}

impl MatchResult {
    /// The label to render: the matched identity, or [`UNKNOWN_LABEL`].
    pub fn display_label(&self) -> &str {
        self.identity
            .as_ref()
            .map(IdentityLabel::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }
}

/// One detected face: its location plus the embedding extracted from it.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub location: FaceLocation,
    pub embedding: Embedding,
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("backend unavailable: {0}")]
    Backend(String),
}

/// Face detection and embedding extraction, consumed by the pipeline.
///
/// Implementations return one entry per detected face; zero faces is a
/// valid outcome, not an error.
pub trait FaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_distance_identical_is_zero() {
        let a = Embedding::new(vec![0.5, -0.5, 0.25]);
        assert!(a.euclidean_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn euclidean_distance_unit_axes() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!((a.euclidean_distance(&b) - 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn is_match_respects_tolerance() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![0.6, 0.0]);
        assert!(a.is_match(&b, 0.6));
        assert!(!a.is_match(&b, 0.59));
    }

    #[test]
    fn label_rejects_empty_and_separators() {
        assert!(IdentityLabel::new("").is_err());
        assert!(IdentityLabel::new("a/b").is_err());
        assert!(IdentityLabel::new("a\\b").is_err());
        assert!(IdentityLabel::new("alice").is_ok());
    }

    #[test]
    fn label_round_trips_through_string() {
        let label = IdentityLabel::new("bob").unwrap();
        let s: String = label.clone().into();
        assert_eq!(IdentityLabel::try_from(s).unwrap(), label);
    }

    #[test]
    fn display_label_substitutes_unknown() {
        let location = FaceLocation { top: 0, right: 10, bottom: 10, left: 0 };
        let unmatched = MatchResult { location, identity: None };
        assert_eq!(unmatched.display_label(), UNKNOWN_LABEL);

        let matched = MatchResult {
            location,
            identity: Some(IdentityLabel::new("alice").unwrap()),
        };
        assert_eq!(matched.display_label(), "alice");
    }
}
