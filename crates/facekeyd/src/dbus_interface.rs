use crate::engine::{EngineError, EngineHandle};
use facekey_core::{AuthDecision, FlowError};
use zbus::interface;

/// D-Bus interface for the facekey daemon.
///
/// Bus name: org.facekey.FaceKey1
/// Object path: /org/facekey/FaceKey1
pub struct FaceKeyService {
    engine: EngineHandle,
    match_threshold: f32,
    capture_source: String,
}

impl FaceKeyService {
    pub fn new(engine: EngineHandle, match_threshold: f32, capture_source: String) -> Self {
        Self {
            engine,
            match_threshold,
            capture_source,
        }
    }
}

#[interface(name = "org.facekey.FaceKey1")]
impl FaceKeyService {
    /// Capture a face and enroll it under `identity`. Returns the number
    /// of samples now enrolled for that identity.
    async fn register(&self, identity: &str) -> zbus::fdo::Result<u32> {
        tracing::info!(identity, "register requested");
        let registration = self.engine.register(identity).await.map_err(to_fdo)?;
        Ok(u32::try_from(registration.samples).unwrap_or(u32::MAX))
    }

    /// Capture a face and match it against every enrolled identity.
    async fn authenticate(&self) -> zbus::fdo::Result<String> {
        tracing::info!("authenticate requested");
        let decision = self.engine.authenticate().await.map_err(to_fdo)?;
        Ok(decision_json(&decision).to_string())
    }

    /// Enrolled identity labels, in enrollment order.
    async fn list_identities(&self) -> zbus::fdo::Result<Vec<String>> {
        tracing::debug!("list_identities requested");
        self.engine.list_identities().await.map_err(to_fdo)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let summary = self.engine.summary().await.map_err(to_fdo)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "capture": self.capture_source,
            "match_threshold": self.match_threshold,
            "identities": summary.identities,
            "samples": summary.samples,
        })
        .to_string())
    }
}

/// JSON body returned by `Authenticate`. An infinite distance (nothing
/// enrolled) is reported as `null`.
pub fn decision_json(decision: &AuthDecision) -> serde_json::Value {
    let distance = decision.distance();
    let distance = if distance.is_finite() {
        serde_json::json!(distance)
    } else {
        serde_json::Value::Null
    };
    match decision {
        AuthDecision::Accept { identity, .. } => serde_json::json!({
            "accepted": true,
            "identity": identity,
            "distance": distance,
        }),
        AuthDecision::Reject { best } => serde_json::json!({
            "accepted": false,
            "identity": serde_json::Value::Null,
            "candidate": best.identity,
            "distance": distance,
        }),
    }
}

fn to_fdo(e: EngineError) -> zbus::fdo::Error {
    use zbus::fdo::Error;
    match e {
        EngineError::Flow(FlowError::InvalidIdentity) => Error::InvalidArgs(e.to_string()),
        EngineError::Flow(FlowError::CaptureTimeout(_)) | EngineError::Timeout(_) => {
            Error::TimedOut(e.to_string())
        }
        other => Error::Failed(other.to_string()),
    }
}
