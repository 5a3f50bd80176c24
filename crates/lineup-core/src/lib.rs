//! lineup-core — the face-gallery matching engine.
//!
//! Builds a labeled gallery of face embeddings from a training corpus,
//! persists it to a single binary file, and identifies faces in query
//! photos by threshold comparison plus plurality vote. Detection and
//! rendering are collaborators behind the [`FaceDetector`] trait and the
//! [`Recognition`] hand-off.

pub mod gallery;
pub mod matcher;
pub mod pipeline;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use gallery::{build_gallery, GalleryReport};
pub use matcher::{match_one, DEFAULT_TOLERANCE};
pub use pipeline::{recognize, validate_all, PipelineError, Recognition, ValidationReport};
pub use store::{EmbeddingStore, StoreError};
pub use types::{
    DetectedFace, DetectorError, Embedding, FaceDetector, FaceLocation, IdentityLabel,
    MatchResult, UNKNOWN_LABEL,
};
