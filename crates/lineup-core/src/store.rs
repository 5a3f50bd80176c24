//! Persisted gallery of labeled face embeddings.
//!
//! Two parallel sequences, `labels[i]` owning `encodings[i]`, written to a
//! single bincode file. Built once during training, then loaded read-only
//! for every recognition run.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Embedding, IdentityLabel};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("gallery file not found: {0} — run --train first")]
    NotFound(String),
    #[error("gallery file is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parallel label/embedding sequences. The same identity may own many
/// embeddings, one per training face; no deduplication.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingStore {
    labels: Vec<IdentityLabel>,
    encodings: Vec<Embedding>,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one labeled embedding. The only mutation the store supports.
    pub fn push(&mut self, label: IdentityLabel, embedding: Embedding) {
        self.labels.push(label);
        self.encodings.push(embedding);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterate label/embedding pairs in insertion order.
    ///
    /// Insertion order is a public contract: the plurality vote in
    /// [`crate::matcher`] breaks ties toward the first-encountered label,
    /// so iteration must never reorder entries.
    pub fn iter(&self) -> impl Iterator<Item = (&IdentityLabel, &Embedding)> {
        self.labels.iter().zip(self.encodings.iter())
    }

    /// Serialize the store to `path`, creating or overwriting the file.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self).map_err(|err| match *err {
            bincode::ErrorKind::Io(io) => StoreError::Io(io),
            other => StoreError::Corrupt(other.to_string()),
        })?;
        Ok(())
    }

    /// Deserialize a store from `path`.
    ///
    /// An absent file is [`StoreError::NotFound`]; bytes that do not decode
    /// into equal-length parallel sequences are [`StoreError::Corrupt`].
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NotFound(path.display().to_string())
            } else {
                StoreError::Io(err)
            }
        })?;
        let store: Self = bincode::deserialize_from(BufReader::new(file))
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        if store.labels.len() != store.encodings.len() {
            return Err(StoreError::Corrupt(format!(
                "parallel sequences disagree: {} labels vs {} encodings",
                store.labels.len(),
                store.encodings.len()
            )));
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(name: &str) -> IdentityLabel {
        IdentityLabel::new(name).unwrap()
    }

    fn sample_store() -> EmbeddingStore {
        let mut store = EmbeddingStore::new();
        store.push(label("alice"), Embedding::new(vec![0.25, -1.5, 0.125]));
        store.push(label("bob"), Embedding::new(vec![0.1, 0.2, 0.3]));
        store.push(label("alice"), Embedding::new(vec![0.26, -1.4, 0.120]));
        store
    }

    #[test]
    fn round_trip_preserves_pairs_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.bin");

        let store = sample_store();
        store.save(&path).unwrap();
        let loaded = EmbeddingStore::load(&path).unwrap();

        assert_eq!(loaded, store);
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let store = sample_store();
        let names: Vec<&str> = store.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(names, ["alice", "bob", "alice"]);
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = EmbeddingStore::load(&dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)), "got {err:?}");
    }

    #[test]
    fn load_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.bin");
        std::fs::write(&path, b"\xff\xff\xff\xff\xff\xff\xff\xffnot a gallery").unwrap();

        let err = EmbeddingStore::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)), "got {err:?}");
    }

    #[test]
    fn save_into_missing_parent_is_io() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("encodings.bin");

        let err = sample_store().save(&path).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)), "got {err:?}");
    }
}
