//! facekey-core: face registration and matching.
//!
//! Keeps enrolled face embeddings in a durable key-value blob, finds the
//! nearest enrolled identity by Euclidean distance and applies a fixed
//! accept threshold. Face detection and descriptor extraction live behind
//! the [`CaptureAdapter`] trait.

pub mod capture;
pub mod flow;
pub mod matcher;
pub mod persistence;
pub mod store;
pub mod types;

pub use capture::{CaptureAdapter, CaptureError};
pub use flow::{
    authenticate, decide, register, FlowError, FlowSettings, Registration,
    DEFAULT_CAPTURE_TIMEOUT, DEFAULT_MATCH_THRESHOLD,
};
pub use matcher::{EuclideanMatcher, Matcher};
pub use persistence::{DirectoryPersistence, MemoryPersistence, Persistence, DEFAULT_STORE_KEY};
pub use store::{EmbeddingStore, StoreError};
pub use types::{AuthDecision, DimensionMismatch, Embedding, Identity, InvalidIdentity, MatchResult};
