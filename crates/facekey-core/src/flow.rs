//! Registration and authentication flows.
//!
//! Each flow is a short linear sequence: capture, then a read (and for
//! registration a write) of the whole store. Callers running flows
//! concurrently must serialize them around the store; `facekeyd` does so
//! by running every flow on a single engine thread.

use crate::capture::{CaptureAdapter, CaptureError};
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::persistence::{Persistence, DEFAULT_STORE_KEY};
use crate::store::{EmbeddingStore, StoreError};
use crate::types::{AuthDecision, DimensionMismatch, Embedding, Identity, MatchResult};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Euclidean distance below which a probe is accepted.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.8;

pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("identity label must not be empty")]
    InvalidIdentity,
    #[error("no face detected")]
    NoFaceDetected,
    #[error("no face captured within {0:?}")]
    CaptureTimeout(Duration),
    #[error(transparent)]
    Capture(CaptureError),
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatch),
    #[error("store: {0}")]
    Store(StoreError),
}

impl From<StoreError> for FlowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidIdentity => FlowError::InvalidIdentity,
            StoreError::DimensionMismatch(d) => FlowError::DimensionMismatch(d),
            other => FlowError::Store(other),
        }
    }
}

impl From<CaptureError> for FlowError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::Timeout(t) => FlowError::CaptureTimeout(t),
            other => FlowError::Capture(other),
        }
    }
}

/// Tunables shared by both flows.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// Persistence key holding the serialized store.
    pub store_key: String,
    /// Accept iff the best distance is strictly below this value.
    pub match_threshold: f32,
    /// Upper bound on a single capture.
    pub capture_timeout: Duration,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            store_key: DEFAULT_STORE_KEY.to_string(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
        }
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub identity: String,
    /// Samples now enrolled under the identity, including the new one.
    pub samples: usize,
}

/// Enroll one freshly captured embedding under `identity`.
///
/// Nothing is written unless the label is valid and a face was captured
/// within the timeout.
pub fn register<C, P>(
    identity: &str,
    capture: &mut C,
    persistence: &P,
    settings: &FlowSettings,
) -> Result<Registration, FlowError>
where
    C: CaptureAdapter + ?Sized,
    P: Persistence + ?Sized,
{
    let identity = Identity::parse(identity).map_err(|_| FlowError::InvalidIdentity)?;

    let embedding = capture_one(capture, settings.capture_timeout)?;

    let mut store = EmbeddingStore::load(persistence, &settings.store_key);
    let samples = store.append(&identity, embedding)?;
    store.save(persistence, &settings.store_key)?;

    tracing::info!(identity = %identity, samples, "face registered");

    Ok(Registration {
        identity: identity.into_string(),
        samples,
    })
}

/// Capture a probe and decide whether it belongs to an enrolled identity.
pub fn authenticate<C, P>(
    capture: &mut C,
    persistence: &P,
    settings: &FlowSettings,
) -> Result<AuthDecision, FlowError>
where
    C: CaptureAdapter + ?Sized,
    P: Persistence + ?Sized,
{
    let probe = capture_one(capture, settings.capture_timeout)?;

    let store = EmbeddingStore::load(persistence, &settings.store_key);
    let best = EuclideanMatcher.find_best_match(&store, &probe)?;
    let decision = decide(best, settings.match_threshold);

    match &decision {
        AuthDecision::Accept { identity, distance } => {
            tracing::info!(identity = %identity, distance, "face matched");
        }
        AuthDecision::Reject { best } => {
            tracing::info!(
                candidate = ?best.identity,
                distance = best.distance,
                threshold = settings.match_threshold,
                "face not recognized"
            );
        }
    }

    Ok(decision)
}

/// Accept iff there is a best identity and its distance is strictly
/// below `threshold`.
pub fn decide(best: MatchResult, threshold: f32) -> AuthDecision {
    match best.identity {
        Some(identity) if best.distance < threshold => AuthDecision::Accept {
            identity,
            distance: best.distance,
        },
        identity => AuthDecision::Reject {
            best: MatchResult {
                identity,
                distance: best.distance,
            },
        },
    }
}

/// Run one bounded capture. A result delivered after the deadline is
/// discarded.
fn capture_one<C: CaptureAdapter + ?Sized>(
    capture: &mut C,
    timeout: Duration,
) -> Result<Embedding, FlowError> {
    let started = Instant::now();
    let captured = capture.capture(timeout)?;
    let elapsed = started.elapsed();

    if elapsed > timeout {
        tracing::warn!(?elapsed, ?timeout, source = %capture.describe(), "capture overran timeout; discarding");
        return Err(FlowError::CaptureTimeout(timeout));
    }

    let embedding = captured.ok_or(FlowError::NoFaceDetected)?;
    tracing::debug!(dimension = embedding.dimension(), ?elapsed, "capture complete");
    Ok(embedding)
}
