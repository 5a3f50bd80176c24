//! Gallery construction from a labeled training corpus.
//!
//! The training root's immediate sub-directories name identities; every
//! regular file inside one is a training photo for that identity. Per-file
//! failures are skipped and counted, never fatal to the build.

use std::path::Path;

use crate::store::EmbeddingStore;
use crate::types::{FaceDetector, IdentityLabel};

/// Outcome of a gallery build. `files_skipped` is surfaced to the operator
/// so curation problems in the training corpus are visible.
#[derive(Debug)]
pub struct GalleryReport {
    pub store: EmbeddingStore,
    pub images_indexed: usize,
    pub files_skipped: usize,
}

/// Walk `training_root` and build an in-memory gallery.
///
/// Every face found in a training photo contributes one embedding tagged
/// with the photo's directory label. A photo with several faces tags them
/// all with the same label; curating clean training directories is the
/// operator's job. Nothing is written to disk; the caller persists the
/// store via [`EmbeddingStore::save`].
pub fn build_gallery<D: FaceDetector>(
    training_root: &Path,
    detector: &mut D,
) -> Result<GalleryReport, std::io::Error> {
    let mut store = EmbeddingStore::new();
    let mut images_indexed = 0usize;
    let mut files_skipped = 0usize;

    for entry in std::fs::read_dir(training_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let dir_name = entry.file_name();
        let label = match dir_name.to_str().map(IdentityLabel::new) {
            Some(Ok(label)) => label,
            _ => {
                tracing::warn!(
                    directory = %entry.path().display(),
                    "directory name is not a usable identity label, skipping"
                );
                continue;
            }
        };

        let files = match std::fs::read_dir(entry.path()) {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(
                    directory = %entry.path().display(),
                    error = %err,
                    "cannot enumerate training directory, skipping"
                );
                continue;
            }
        };

        for file in files.flatten() {
            let path = file.path();
            if !file.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let image = match image::open(&path) {
                Ok(image) => image.to_rgb8(),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "unreadable training image, skipping"
                    );
                    files_skipped += 1;
                    continue;
                }
            };

            let faces = match detector.detect(&image) {
                Ok(faces) => faces,
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "detection failed on training image, skipping"
                    );
                    files_skipped += 1;
                    continue;
                }
            };

            // Zero faces is valid: the photo just contributes nothing.
            if faces.is_empty() {
                tracing::debug!(path = %path.display(), "no face detected in training image");
            }
            for face in faces {
                store.push(label.clone(), face.embedding);
            }
            images_indexed += 1;
        }
    }

    tracing::info!(
        entries = store.len(),
        images = images_indexed,
        skipped = files_skipped,
        "gallery built"
    );

    Ok(GalleryReport {
        store,
        images_indexed,
        files_skipped,
    })
}
