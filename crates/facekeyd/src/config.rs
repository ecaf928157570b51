use facekey_capture::{CaptureSource, SourceError};
use facekey_core::{DirectoryPersistence, FlowSettings, DEFAULT_MATCH_THRESHOLD, DEFAULT_STORE_KEY};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("match threshold must be a positive finite number, got {0}")]
    InvalidThreshold(f32),
    #[error("store key {key:?} cannot name a file in the store directory: {source}")]
    InvalidStoreKey {
        key: String,
        source: std::io::Error,
    },
    #[error("capture timeout must be at least one second")]
    InvalidTimeout,
    #[error(transparent)]
    Capture(#[from] SourceError),
}

/// Optional settings from `facekeyd.toml`. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    store_dir: Option<PathBuf>,
    store_key: Option<String>,
    match_threshold: Option<f32>,
    capture_timeout_secs: Option<u64>,
    capture_command: Option<Vec<String>>,
    capture_drop_file: Option<PathBuf>,
}

/// Daemon configuration: compiled defaults, then the TOML file, then
/// `FACEKEY_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the persisted store blob.
    pub store_dir: PathBuf,
    /// Key (file stem) of the store blob.
    pub store_key: String,
    /// Euclidean distance below which a probe is accepted.
    pub match_threshold: f32,
    /// Upper bound on a single capture, in seconds.
    pub capture_timeout_secs: u64,
    /// Where probe descriptors come from.
    pub capture: CaptureSource,
}

impl Config {
    /// Load from the process environment and the config file it points at.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `env` as the environment lookup.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let file = match config_path(&env) {
            (path, true) => Some(read_file(&path)?),
            (path, false) if path.exists() => Some(read_file(&path)?),
            _ => None,
        }
        .unwrap_or_default();

        let store_dir = env("FACEKEY_STORE_DIR")
            .map(PathBuf::from)
            .or(file.store_dir)
            .unwrap_or_else(|| data_dir(&env));

        let store_key = env("FACEKEY_STORE_KEY")
            .filter(|k| !k.trim().is_empty())
            .or(file.store_key)
            .unwrap_or_else(|| DEFAULT_STORE_KEY.to_string());
        DirectoryPersistence::new(&store_dir)
            .path_for(&store_key)
            .map_err(|source| ConfigError::InvalidStoreKey {
                key: store_key.clone(),
                source,
            })?;

        let match_threshold = env_parse(&env, "FACEKEY_MATCH_THRESHOLD")
            .or(file.match_threshold)
            .unwrap_or(DEFAULT_MATCH_THRESHOLD);
        if !match_threshold.is_finite() || match_threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(match_threshold));
        }

        let capture_timeout_secs = env_parse(&env, "FACEKEY_CAPTURE_TIMEOUT_SECS")
            .or(file.capture_timeout_secs)
            .unwrap_or(10);
        if capture_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        let command = env("FACEKEY_CAPTURE_COMMAND")
            .map(|line| line.split_whitespace().map(str::to_string).collect())
            .or(file.capture_command);
        let drop_file = env("FACEKEY_CAPTURE_DROP_FILE")
            .map(PathBuf::from)
            .or(file.capture_drop_file);
        let capture = CaptureSource::resolve(command, drop_file)?;

        Ok(Self {
            store_dir,
            store_key,
            match_threshold,
            capture_timeout_secs,
            capture,
        })
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    /// Settings handed to the registration and authentication flows.
    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            store_key: self.store_key.clone(),
            match_threshold: self.match_threshold,
            capture_timeout: self.capture_timeout(),
        }
    }
}

/// Config file location and whether it was named explicitly.
fn config_path(env: &impl Fn(&str) -> Option<String>) -> (PathBuf, bool) {
    if let Some(path) = env("FACEKEY_CONFIG") {
        return (PathBuf::from(path), true);
    }
    let base = env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(env).join(".config"));
    (base.join("facekey").join("facekeyd.toml"), false)
}

fn data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(env).join(".local/share"))
        .join("facekey")
}

fn home(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(env("HOME").unwrap_or_else(|| "/tmp".to_string()))
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(file)
}

fn env_parse<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
