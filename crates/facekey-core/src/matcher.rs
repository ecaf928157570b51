use crate::store::EmbeddingStore;
use crate::types::{DimensionMismatch, Embedding, MatchResult};

/// Strategy for finding the closest enrolled identity to a probe.
///
/// Implementations report the raw best candidate; accepting or rejecting
/// it is left to the caller.
pub trait Matcher {
    fn find_best_match(
        &self,
        store: &EmbeddingStore,
        probe: &Embedding,
    ) -> Result<MatchResult, DimensionMismatch>;
}

/// Nearest sample by Euclidean distance.
///
/// Visits every enrolled sample. On equal distances the first sample in
/// store order wins. A non-empty store always yields a candidate, even
/// when the distance overflows to infinity.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn find_best_match(
        &self,
        store: &EmbeddingStore,
        probe: &Embedding,
    ) -> Result<MatchResult, DimensionMismatch> {
        let mut best = MatchResult::none();

        for (identity, sample) in store.iter() {
            let distance = probe.euclidean_distance(sample)?;
            if best.identity.is_none() || distance < best.distance {
                best = MatchResult {
                    identity: Some(identity.to_string()),
                    distance,
                };
            }
        }

        Ok(best)
    }
}
