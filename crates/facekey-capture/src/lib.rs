//! facekey-capture: capture adapters backed by external extractors.
//!
//! facekey never runs a face model itself. These adapters hand the job to
//! an external program and read back one descriptor per capture.

pub mod command;
pub mod descriptor;
pub mod drop_file;

pub use command::ExtractorCommand;
pub use descriptor::parse_descriptor;
pub use drop_file::DescriptorDrop;

use facekey_core::CaptureAdapter;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("extractor command is empty")]
    EmptyCommand,
    #[error("no capture source configured (set a command or a drop file)")]
    Unconfigured,
    #[error("both a capture command and a drop file are configured; pick one")]
    Ambiguous,
}

/// Where captures come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    /// Run this argv once per capture.
    Command(Vec<String>),
    /// Pick up descriptors dropped at this path.
    DropFile(PathBuf),
}

impl CaptureSource {
    /// Resolve the optional settings into exactly one source.
    pub fn resolve(command: Option<Vec<String>>, drop_file: Option<PathBuf>) -> Result<Self, SourceError> {
        match (command, drop_file) {
            (Some(_), Some(_)) => Err(SourceError::Ambiguous),
            (Some(argv), None) => Ok(Self::Command(argv)),
            (None, Some(path)) => Ok(Self::DropFile(path)),
            (None, None) => Err(SourceError::Unconfigured),
        }
    }

    /// Build the adapter for this source.
    pub fn open(&self) -> Result<Box<dyn CaptureAdapter + Send>, SourceError> {
        let adapter: Box<dyn CaptureAdapter + Send> = match self {
            Self::Command(argv) => Box::new(ExtractorCommand::new(argv.clone())?),
            Self::DropFile(path) => Box::new(DescriptorDrop::new(path.clone())),
        };
        tracing::info!(source = %adapter.describe(), "capture adapter ready");
        Ok(adapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_requires_exactly_one_source() {
        assert!(matches!(CaptureSource::resolve(None, None), Err(SourceError::Unconfigured)));
        assert!(matches!(
            CaptureSource::resolve(Some(vec!["x".into()]), Some("/tmp/p".into())),
            Err(SourceError::Ambiguous)
        ));
        assert_eq!(
            CaptureSource::resolve(None, Some("/tmp/p".into())).unwrap(),
            CaptureSource::DropFile("/tmp/p".into())
        );
    }

    #[test]
    fn test_open_builds_adapter() {
        let source = CaptureSource::Command(vec!["extract-face".into(), "--once".into()]);
        assert_eq!(source.open().unwrap().describe(), "command:extract-face");

        let source = CaptureSource::DropFile("/run/facekey/probe.json".into());
        assert_eq!(source.open().unwrap().describe(), "drop:/run/facekey/probe.json");

        assert!(matches!(
            CaptureSource::Command(vec![]).open(),
            Err(SourceError::EmptyCommand)
        ));
    }
}
