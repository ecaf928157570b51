use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Two embeddings of different lengths were compared or mixed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("embedding dimension mismatch: expected {expected}, got {actual}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// The identity label was empty after trimming.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("identity label must not be empty")]
pub struct InvalidIdentity;

/// Face embedding vector (128-dimensional for the usual descriptor models).
///
/// Serialized as a bare JSON array of numbers. The values cannot be
/// changed once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Euclidean distance: square root of the summed per-dimension squared
    /// differences. Both embeddings must have the same length.
    pub fn euclidean_distance(&self, other: &Embedding) -> Result<f32, DimensionMismatch> {
        if self.values.len() != other.values.len() {
            return Err(DimensionMismatch {
                expected: self.values.len(),
                actual: other.values.len(),
            });
        }

        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt())
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// A user-chosen label under which embeddings are enrolled.
///
/// Always trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Trim surrounding whitespace and reject blank labels.
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentity> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidIdentity);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Closest stored identity for a probe, before any threshold is applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Best identity, or `None` when nothing was enrolled.
    pub identity: Option<String>,
    /// Euclidean distance to the best sample; `+inf` when there is none.
    pub distance: f32,
}

impl MatchResult {
    pub fn none() -> Self {
        Self {
            identity: None,
            distance: f32::INFINITY,
        }
    }
}

/// Outcome of an authentication attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthDecision {
    Accept { identity: String, distance: f32 },
    Reject { best: MatchResult },
}

impl AuthDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthDecision::Accept { .. })
    }

    /// Identity of the accepted match, if any.
    pub fn identity(&self) -> Option<&str> {
        match self {
            AuthDecision::Accept { identity, .. } => Some(identity),
            AuthDecision::Reject { .. } => None,
        }
    }

    /// Distance of the best candidate considered.
    pub fn distance(&self) -> f32 {
        match self {
            AuthDecision::Accept { distance, .. } => *distance,
            AuthDecision::Reject { best } => best.distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.25, -1.0, 3.5]);
        assert_eq!(a.euclidean_distance(&a.clone()).unwrap(), 0.0);
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b).unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_dimension_mismatch() {
        let a = Embedding::new(vec![1.0, 2.0]);
        let b = Embedding::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(
            a.euclidean_distance(&b),
            Err(DimensionMismatch { expected: 2, actual: 3 })
        );
    }

    #[test]
    fn test_embedding_serializes_as_bare_array() {
        let e = Embedding::new(vec![0.5, 1.0]);
        assert_eq!(serde_json::to_string(&e).unwrap(), "[0.5,1.0]");
        let back: Embedding = serde_json::from_str("[0.5, 1]").unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_embedding_finite_check() {
        assert!(Embedding::new(vec![1.0, -2.0]).is_finite());
        assert!(!Embedding::new(vec![1.0, f32::NAN]).is_finite());
        assert!(!Embedding::new(vec![f32::INFINITY]).is_finite());
    }

    #[test]
    fn test_identity_trims() {
        let id = Identity::parse("  alice \n").unwrap();
        assert_eq!(id.as_str(), "alice");
    }

    #[test]
    fn test_identity_rejects_blank() {
        assert_eq!(Identity::parse(""), Err(InvalidIdentity));
        assert_eq!(Identity::parse("  "), Err(InvalidIdentity));
        assert_eq!(Identity::parse("\t\n"), Err(InvalidIdentity));
    }

    #[test]
    fn test_auth_decision_accessors() {
        let accept = AuthDecision::Accept { identity: "alice".into(), distance: 0.2 };
        assert!(accept.is_accepted());
        assert_eq!(accept.identity(), Some("alice"));

        let reject = AuthDecision::Reject { best: MatchResult::none() };
        assert!(!reject.is_accepted());
        assert_eq!(reject.identity(), None);
        assert!(reject.distance().is_infinite());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn distance_is_symmetric(
                a in proptest::collection::vec(-10.0f32..10.0, 1..32),
                b in proptest::collection::vec(-10.0f32..10.0, 1..32),
            ) {
                let len = a.len().min(b.len());
                let a = Embedding::new(a[..len].to_vec());
                let b = Embedding::new(b[..len].to_vec());
                prop_assert_eq!(a.euclidean_distance(&b), b.euclidean_distance(&a));
            }

            #[test]
            fn distance_is_non_negative(
                a in proptest::collection::vec(-10.0f32..10.0, 8),
                b in proptest::collection::vec(-10.0f32..10.0, 8),
            ) {
                let d = Embedding::new(a).euclidean_distance(&Embedding::new(b)).unwrap();
                prop_assert!(d >= 0.0);
            }
        }
    }
}
