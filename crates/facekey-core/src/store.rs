//! Embedding store: identity label → ordered enrolled samples.
//!
//! Persisted as a single JSON object `{"label": [[f32, ...], ...]}` under
//! one well-known key. Identities keep their insertion order. Mutation is
//! append-only.

use crate::persistence::Persistence;
use crate::types::{DimensionMismatch, Embedding, Identity};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("identity label must not be empty")]
    InvalidIdentity,
    #[error("embedding must not be empty")]
    EmptyEmbedding,
    #[error("embedding contains non-finite values")]
    NonFiniteEmbedding,
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatch),
    #[error("store is corrupt: {0}")]
    StoreCorrupt(String),
    #[error("persistence: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Snapshot of every enrolled identity and its samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingStore {
    faces: IndexMap<String, Vec<Embedding>>,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the store, substituting an empty one if it is absent or unreadable.
    pub fn load<P: Persistence + ?Sized>(persistence: &P, key: &str) -> Self {
        match Self::try_load(persistence, key) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(key, error = %e, "embedding store unreadable; starting empty");
                Self::new()
            }
        }
    }

    /// Strict variant of [`load`](Self::load): reports corrupt or
    /// unreadable data instead of recovering.
    pub fn try_load<P: Persistence + ?Sized>(persistence: &P, key: &str) -> Result<Self, StoreError> {
        let Some(text) = persistence.get(key)? else {
            return Ok(Self::new());
        };
        Self::from_json(&text)
    }

    /// Parse and validate a serialized store.
    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        let store: Self =
            serde_json::from_str(text).map_err(|e| StoreError::StoreCorrupt(e.to_string()))?;
        store.validate()?;
        Ok(store)
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    fn validate(&self) -> Result<(), StoreError> {
        for (name, samples) in &self.faces {
            if name.trim().is_empty() {
                return Err(StoreError::StoreCorrupt("blank identity key".into()));
            }
            if name.trim() != name {
                return Err(StoreError::StoreCorrupt(format!(
                    "identity key {name:?} has surrounding whitespace"
                )));
            }
            let Some(first) = samples.first() else {
                continue;
            };
            for sample in samples {
                if sample.is_empty() {
                    return Err(StoreError::StoreCorrupt(format!(
                        "empty embedding under {name:?}"
                    )));
                }
                if !sample.is_finite() {
                    return Err(StoreError::StoreCorrupt(format!(
                        "non-finite embedding under {name:?}"
                    )));
                }
                if sample.dimension() != first.dimension() {
                    return Err(StoreError::StoreCorrupt(format!(
                        "mixed dimensions under {name:?}: {} and {}",
                        first.dimension(),
                        sample.dimension()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Add `embedding` at the end of `identity`'s samples, creating the
    /// identity if it is new. The caller persists the result with
    /// [`save`](Self::save).
    ///
    /// Returns the number of samples now enrolled under `identity`.
    pub fn append(&mut self, identity: &Identity, embedding: Embedding) -> Result<usize, StoreError> {
        if identity.as_str().trim().is_empty() {
            return Err(StoreError::InvalidIdentity);
        }
        if embedding.is_empty() {
            return Err(StoreError::EmptyEmbedding);
        }
        if !embedding.is_finite() {
            return Err(StoreError::NonFiniteEmbedding);
        }
        if let Some(first) = self.faces.get(identity.as_str()).and_then(|s| s.first()) {
            if first.dimension() != embedding.dimension() {
                return Err(DimensionMismatch {
                    expected: first.dimension(),
                    actual: embedding.dimension(),
                }
                .into());
            }
        }

        let samples = self.faces.entry(identity.as_str().to_string()).or_default();
        samples.push(embedding);
        Ok(samples.len())
    }

    /// Persist the whole store, replacing prior content.
    pub fn save<P: Persistence + ?Sized>(&self, persistence: &P, key: &str) -> Result<(), StoreError> {
        persistence.set(key, &self.to_json()?)?;
        Ok(())
    }

    /// Enrolled identities in insertion order.
    pub fn list_identities(&self) -> Vec<String> {
        self.faces.keys().cloned().collect()
    }

    /// Samples enrolled under `identity`, oldest first.
    pub fn samples(&self, identity: &str) -> Option<&[Embedding]> {
        self.faces.get(identity).map(Vec::as_slice)
    }

    /// Every (identity, sample) pair in store order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Embedding)> {
        self.faces
            .iter()
            .flat_map(|(name, samples)| samples.iter().map(move |s| (name.as_str(), s)))
    }

    pub fn identity_count(&self) -> usize {
        self.faces.len()
    }

    pub fn sample_count(&self) -> usize {
        self.faces.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }
}
