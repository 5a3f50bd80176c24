//! Threshold comparison plus plurality vote over the gallery.
//!
//! Every stored embedding within `tolerance` of the probe casts one vote for
//! its label; the label with the most votes wins. This is the system's only
//! classification rule: a nearest-neighbor-by-threshold vote, not a learned
//! classifier, and a linear scan of the gallery per probe.

use crate::store::EmbeddingStore;
use crate::types::{Embedding, IdentityLabel};

/// Default match tolerance.
///
/// Euclidean distance over L2-normalised ArcFace embeddings; 1.10
/// corresponds to cosine similarity of roughly 0.40, the conventional
/// accept threshold for this model family.
pub const DEFAULT_TOLERANCE: f32 = 1.10;

/// Vote counts kept in first-seen order.
///
/// The explicit ordering makes the tie-break rule testable: when two labels
/// finish with equal counts, the one recorded earliest wins.
#[derive(Debug, Default)]
pub struct VoteTally {
    entries: Vec<(IdentityLabel, usize)>,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, label: &IdentityLabel) {
        match self.entries.iter_mut().find(|(l, _)| l == label) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((label.clone(), 1)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The label with the most votes; ties resolve to the first-seen label.
    pub fn winner(self) -> Option<IdentityLabel> {
        let mut best: Option<(IdentityLabel, usize)> = None;
        for (label, count) in self.entries {
            // Strict > keeps the earliest label on equal counts.
            match &best {
                Some((_, best_count)) if count <= *best_count => {}
                _ => best = Some((label, count)),
            }
        }
        best.map(|(label, _)| label)
    }
}

/// Resolve one unknown embedding against the gallery.
///
/// Returns `None` when nothing in the store is within `tolerance`; the
/// caller substitutes the `"Unknown"` sentinel. The tie-break toward the
/// first-encountered label reproduces the original plurality-vote
/// semantics; it is a policy choice, not an accuracy-optimal one.
pub fn match_one(
    unknown: &Embedding,
    store: &EmbeddingStore,
    tolerance: f32,
) -> Option<IdentityLabel> {
    let mut votes = VoteTally::new();
    for (label, stored) in store.iter() {
        if stored.is_match(unknown, tolerance) {
            votes.record(label);
        }
    }
    votes.winner()
}
