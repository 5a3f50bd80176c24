//! lineup-detect — ONNX-backed face detection and embedding extraction.
//!
//! SCRFD locates faces in an RGB photograph; each face is aligned by its
//! five landmarks and embedded with ArcFace (w600k_r50, 512-d,
//! L2-normalised). Implements [`lineup_core::FaceDetector`] for the
//! recognition pipeline.

mod align;
mod arcface;
mod scrfd;

use std::path::{Path, PathBuf};

use image::RgbImage;
use lineup_core::{DetectedFace, DetectorError, FaceDetector};
use ort::session::builder::SessionBuilder;
use ort::session::Session;

use arcface::ArcFace;
use scrfd::Scrfd;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Detection backend. Names carry over from the original command surface:
/// `hog` runs on the CPU execution provider, `cnn` on CUDA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Hog,
    Cnn,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Hog => "hog",
            Backend::Cnn => "cnn",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default location for the ONNX model files, relative to the working
/// directory. Overridable through the CLI configuration.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

pub(crate) fn ort_err(err: ort::Error) -> DetectorError {
    DetectorError::Inference(err.to_string())
}

/// Build an ONNX session for `model_path` on the requested backend,
/// failing fast when the model file is absent.
pub(crate) fn build_session(model_path: &Path, backend: Backend) -> Result<Session, DetectorError> {
    if !model_path.exists() {
        return Err(DetectorError::ModelNotFound(
            model_path.display().to_string(),
        ));
    }

    let builder = Session::builder()
        .map_err(ort_err)?
        .with_intra_threads(2)
        .map_err(ort_err)?;
    let builder = match backend {
        Backend::Hog => builder,
        Backend::Cnn => with_cuda(builder)?,
    };
    builder.commit_from_file(model_path).map_err(ort_err)
}

#[cfg(feature = "cuda")]
fn with_cuda(builder: SessionBuilder) -> Result<SessionBuilder, DetectorError> {
    use ort::execution_providers::CUDAExecutionProvider;
    builder
        .with_execution_providers([CUDAExecutionProvider::default().build()])
        .map_err(|err| DetectorError::Backend(err.to_string()))
}

#[cfg(not(feature = "cuda"))]
fn with_cuda(builder: SessionBuilder) -> Result<SessionBuilder, DetectorError> {
    tracing::warn!("cnn backend requested but built without the cuda feature; using CPU");
    Ok(builder)
}

/// SCRFD + ArcFace detector over ONNX Runtime.
pub struct OnnxDetector {
    scrfd: Scrfd,
    arcface: ArcFace,
}

impl OnnxDetector {
    /// Load both models from `model_dir`. Fails fast if either file is
    /// missing so a misconfigured run dies before touching any photos.
    pub fn load(model_dir: &Path, backend: Backend) -> Result<Self, DetectorError> {
        let scrfd = Scrfd::load(&model_dir.join(SCRFD_MODEL_FILE), backend)?;
        let arcface = ArcFace::load(&model_dir.join(ARCFACE_MODEL_FILE), backend)?;
        tracing::info!(
            model_dir = %model_dir.display(),
            backend = %backend,
            "detector loaded"
        );
        Ok(Self { scrfd, arcface })
    }
}

impl FaceDetector for OnnxDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError> {
        let raw = self.scrfd.detect(image)?;
        let mut faces = Vec::with_capacity(raw.len());
        for face in raw {
            let aligned = align::align_face(image, &face.landmarks);
            let embedding = self.arcface.embed(&aligned)?;
            faces.push(DetectedFace {
                location: face.location(image.width(), image.height()),
                embedding,
            });
        }
        Ok(faces)
    }
}
