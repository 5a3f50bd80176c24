//! Recognition over single photos and whole validation corpora.

use std::path::Path;

use image::RgbImage;
use thiserror::Error;
use walkdir::WalkDir;

use crate::matcher;
use crate::store::EmbeddingStore;
use crate::types::{DetectorError, FaceDetector, MatchResult};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("unreadable image {path}: {source}")]
    UnreadableImage {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Detector(#[from] DetectorError),
}

/// A recognized photo: the decoded pixels plus per-face results, ready for
/// the rendering collaborator.
#[derive(Debug)]
pub struct Recognition {
    pub image: RgbImage,
    pub matches: Vec<MatchResult>,
}

/// Identify every face in one photo against a loaded gallery.
///
/// Results come back in the order the detector reported faces; no
/// re-sorting. The store is never mutated, so repeated calls against the
/// same photo and store yield identical results.
pub fn recognize<D: FaceDetector>(
    image_path: &Path,
    store: &EmbeddingStore,
    detector: &mut D,
    tolerance: f32,
) -> Result<Recognition, PipelineError> {
    let image = image::open(image_path)
        .map_err(|source| PipelineError::UnreadableImage {
            path: image_path.display().to_string(),
            source,
        })?
        .to_rgb8();

    let faces = detector.detect(&image)?;
    tracing::debug!(
        path = %image_path.display(),
        faces = faces.len(),
        "detection complete"
    );

    let matches = faces
        .into_iter()
        .map(|face| MatchResult {
            identity: matcher::match_one(&face.embedding, store, tolerance),
            location: face.location,
        })
        .collect();

    Ok(Recognition { image, matches })
}

/// Summary of a validation batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub files_visited: usize,
    pub files_failed: usize,
}

/// Run [`recognize`] over every regular file under `validation_root`,
/// recursively, forwarding each result to `on_result`.
///
/// Enumeration order is whatever the filesystem yields; every file is
/// visited exactly once. A failure on one file is reported and counted
/// without aborting the rest of the batch.
pub fn validate_all<D, F>(
    validation_root: &Path,
    store: &EmbeddingStore,
    detector: &mut D,
    tolerance: f32,
    mut on_result: F,
) -> ValidationReport
where
    D: FaceDetector,
    F: FnMut(&Path, Recognition),
{
    let mut report = ValidationReport::default();

    for entry in WalkDir::new(validation_root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "cannot enumerate validation entry");
                report.files_failed += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        report.files_visited += 1;
        match recognize(entry.path(), store, detector, tolerance) {
            Ok(recognition) => on_result(entry.path(), recognition),
            Err(err) => {
                tracing::warn!(
                    path = %entry.path().display(),
                    error = %err,
                    "validation file failed"
                );
                report.files_failed += 1;
            }
        }
    }

    tracing::info!(
        visited = report.files_visited,
        failed = report.files_failed,
        "validation complete"
    );
    report
}
