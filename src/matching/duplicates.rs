use super::scorer::{score, DUPLICATE_THRESHOLD};
use crate::types::ContactRecord;
use serde::{Deserialize, Serialize};

/// A candidate pair of potentially duplicate contacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub a: ContactRecord,
    pub b: ContactRecord,
    pub similarity: u32,
    pub reasons: Vec<String>,
}

/// Detect candidate duplicates by exhaustive pairwise scoring.
///
/// Personal contact lists are small, so this stays O(n²). Larger collections
/// would bucket by normalized phone or email prefix first.
///
/// Pairs are returned sorted by similarity, highest first. Ties keep snapshot
/// order.
pub fn find_duplicates(snapshot: &[ContactRecord]) -> Vec<DuplicateCandidate> {
    let mut candidates = Vec::new();

    for i in 0..snapshot.len() {
        for j in (i + 1)..snapshot.len() {
            let a = &snapshot[i];
            let b = &snapshot[j];
            let result = score(a, b);
            if result.value >= DUPLICATE_THRESHOLD {
                candidates.push(DuplicateCandidate {
                    a: a.clone(),
                    b: b.clone(),
                    similarity: result.value,
                    reasons: result.reasons(),
                });
            }
        }
    }

    candidates.sort_by(|x, y| y.similarity.cmp(&x.similarity));
    candidates
}
