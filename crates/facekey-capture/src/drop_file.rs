//! Capture by picking up descriptors an external extractor drops on disk.
//!
//! The extractor should write the file atomically (write elsewhere, then
//! rename into place). Each descriptor is consumed exactly once.

use crate::descriptor::parse_descriptor;
use facekey_core::{CaptureAdapter, CaptureError, Embedding};
use notify::{RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DescriptorDrop {
    path: PathBuf,
}

impl DescriptorDrop {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the extractor renames descriptors into.
    fn drop_dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    /// Read and remove the drop file if it exists.
    fn take(&self) -> Result<Option<String>, CaptureError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CaptureError::Failed(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };

        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(CaptureError::Failed(format!(
                    "failed to consume {}: {e}",
                    self.path.display()
                )));
            }
        }

        Ok(Some(text))
    }
}

impl CaptureAdapter for DescriptorDrop {
    /// Wait for a descriptor to appear, up to `timeout`.
    ///
    /// The drop directory is watched before the first look, so a file
    /// renamed into place at any point is seen.
    fn capture(&mut self, timeout: Duration) -> Result<Option<Embedding>, CaptureError> {
        let deadline = Instant::now() + timeout;
        let dir = self.drop_dir();

        let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
        let mut watcher = notify::recommended_watcher(tx)
            .map_err(|e| CaptureError::Failed(format!("failed to start file watcher: {e}")))?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| CaptureError::Failed(format!("failed to watch {}: {e}", dir.display())))?;

        loop {
            if let Some(text) = self.take()? {
                tracing::debug!(path = %self.path.display(), "descriptor picked up");
                return parse_descriptor(&text);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CaptureError::Timeout(timeout));
            }
            match rx.recv_timeout(remaining) {
                Ok(Ok(event)) => tracing::trace!(kind = ?event.kind, "drop directory changed"),
                Ok(Err(e)) => {
                    return Err(CaptureError::Failed(format!(
                        "watching {} failed: {e}",
                        dir.display()
                    )))
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CaptureError::Failed("file watcher stopped".into()))
                }
            }
        }
    }

    fn describe(&self) -> String {
        format!("drop:{}", self.path.display())
    }
}
