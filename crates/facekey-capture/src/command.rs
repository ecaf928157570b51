//! Capture by running an external extractor program once per frame.

use crate::descriptor::parse_descriptor;
use crate::SourceError;
use facekey_core::{CaptureAdapter, CaptureError, Embedding};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Runs a program that grabs a frame, detects a face and prints its
/// descriptor to stdout in the [`descriptor`](crate::descriptor) format.
#[derive(Debug, Clone)]
pub struct ExtractorCommand {
    program: String,
    args: Vec<String>,
}

impl ExtractorCommand {
    /// Build from an argv list; the first element is the program.
    pub fn new(argv: Vec<String>) -> Result<Self, SourceError> {
        let mut argv = argv.into_iter();
        let program = argv.next().ok_or(SourceError::EmptyCommand)?;
        if program.trim().is_empty() {
            return Err(SourceError::EmptyCommand);
        }
        Ok(Self {
            program,
            args: argv.collect(),
        })
    }

    /// Build from a whitespace-separated command line. No shell quoting.
    pub fn from_command_line(line: &str) -> Result<Self, SourceError> {
        Self::new(line.split_whitespace().map(str::to_string).collect())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the extractor to completion or until `timeout`, whichever is
    /// first. The child is killed if it is still running when this
    /// future is dropped.
    async fn run(&self, timeout: Duration) -> Result<Output, CaptureError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::Failed(format!("failed to spawn {}: {e}", self.program)))?;

        tracing::debug!(program = %self.program, "extractor spawned");

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| {
                CaptureError::Failed(format!("failed to collect output of {}: {e}", self.program))
            }),
            Err(_) => {
                tracing::warn!(program = %self.program, ?timeout, "extractor killed after timeout");
                Err(CaptureError::Timeout(timeout))
            }
        }
    }
}

impl CaptureAdapter for ExtractorCommand {
    fn capture(&mut self, timeout: Duration) -> Result<Option<Embedding>, CaptureError> {
        // Called from the engine's OS thread, outside any runtime.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CaptureError::Failed(format!("failed to start process runtime: {e}")))?;
        let output = runtime.block_on(self.run(timeout))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(CaptureError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(program = %self.program, stderr = %stderr.trim(), "extractor stderr");
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| CaptureError::Malformed(format!("extractor output is not UTF-8: {e}")))?;
        parse_descriptor(&stdout)
    }

    fn describe(&self) -> String {
        format!("command:{}", self.program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> ExtractorCommand {
        ExtractorCommand::new(vec!["sh".into(), "-c".into(), script.into()]).unwrap()
    }

    #[test]
    fn test_reads_descriptor_from_stdout() {
        let mut cmd = sh("echo '[0.25, 0.5, 0.75]'");
        let e = cmd.capture(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(e.values(), &[0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_null_output_is_no_face() {
        let mut cmd = sh("echo null");
        assert_eq!(cmd.capture(Duration::from_secs(5)).unwrap(), None);
    }

    #[test]
    fn test_nonzero_exit_is_failure() {
        let mut cmd = sh("echo 'camera busy' >&2; exit 3");
        match cmd.capture(Duration::from_secs(5)) {
            Err(CaptureError::Failed(msg)) => assert!(msg.contains("camera busy"), "{msg}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_slow_extractor_times_out() {
        let mut cmd = sh("sleep 5; echo null");
        let started = Instant::now();
        let err = cmd.capture(Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, CaptureError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_timed_out_extractor_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let mut cmd = sh(&format!("sleep 1; touch {}; echo null", marker.display()));

        let err = cmd.capture(Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, CaptureError::Timeout(_)));

        std::thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists(), "extractor kept running after the timeout");
    }

    #[test]
    fn test_non_utf8_output_is_malformed() {
        let mut cmd = sh("printf '\\377\\376'");
        assert!(matches!(
            cmd.capture(Duration::from_secs(5)),
            Err(CaptureError::Malformed(_))
        ));
    }

    #[test]
    fn test_capture_is_repeatable() {
        let mut cmd = sh("echo '[1.0]'");
        for _ in 0..3 {
            assert!(cmd.capture(Duration::from_secs(5)).unwrap().is_some());
        }
    }

    #[test]
    fn test_missing_program_is_failure() {
        let mut cmd = ExtractorCommand::new(vec!["/nonexistent/facekey-extractor".into()]).unwrap();
        assert!(matches!(
            cmd.capture(Duration::from_secs(1)),
            Err(CaptureError::Failed(_))
        ));
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(ExtractorCommand::new(vec![]), Err(SourceError::EmptyCommand)));
        assert!(matches!(
            ExtractorCommand::from_command_line("   "),
            Err(SourceError::EmptyCommand)
        ));
    }

    #[test]
    fn test_command_line_split() {
        let cmd = ExtractorCommand::from_command_line("extract-face --camera /dev/video0").unwrap();
        assert_eq!(cmd.program(), "extract-face");
        assert_eq!(cmd.args, vec!["--camera", "/dev/video0"]);
    }
}
