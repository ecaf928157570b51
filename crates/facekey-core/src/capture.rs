use crate::types::Embedding;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),
    #[error("capture failed: {0}")]
    Failed(String),
    #[error("malformed descriptor: {0}")]
    Malformed(String),
}

/// Source of a single still-frame face embedding.
///
/// Detection and descriptor extraction happen behind this boundary.
pub trait CaptureAdapter {
    /// Produce one embedding from the current frame, waiting at most
    /// `timeout`. `Ok(None)` means no face was detected.
    fn capture(&mut self, timeout: Duration) -> Result<Option<Embedding>, CaptureError>;

    /// Short name for logs and status output.
    fn describe(&self) -> String {
        "capture".to_string()
    }
}

impl<C: CaptureAdapter + ?Sized> CaptureAdapter for Box<C> {
    fn capture(&mut self, timeout: Duration) -> Result<Option<Embedding>, CaptureError> {
        (**self).capture(timeout)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
