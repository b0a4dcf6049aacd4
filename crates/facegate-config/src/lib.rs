use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const PRIMARY_CONFIG_PATH: &str = "/etc/facegate/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/facegate/config.toml";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 128;
pub const DEFAULT_ALLOW_THRESHOLD: f64 = 0.9;
pub const DEFAULT_DENY_THRESHOLD: f64 = 0.8;
pub const DEFAULT_WINDOW_MILLIS: u64 = 1500;
pub const DEFAULT_MIN_SAMPLES: usize = 5;
pub const DEFAULT_AGREEMENT_RATIO: f64 = 0.6;
pub const DEFAULT_UNLOCK_CONFIDENCE_THRESHOLD: f64 = 0.7;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_ATTEMPT_WINDOW_SECS: u64 = 30;
pub const DEFAULT_COOLDOWN_SECS: u64 = 30;
pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_STORE_PATH: &str = "/var/lib/facegate/faces.json";
/// Upper bound for `attempt_window_secs` and `cooldown_secs` (one year).
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub embedding_dimension: Option<usize>,
    pub allow_threshold: Option<f64>,
    pub deny_threshold: Option<f64>,
    pub window_millis: Option<u64>,
    pub min_samples: Option<usize>,
    pub agreement_ratio: Option<f64>,
    pub unlock_confidence_threshold: Option<f64>,
    pub max_attempts: Option<u32>,
    pub attempt_window_secs: Option<u64>,
    pub cooldown_secs: Option<u64>,
    pub min_detection_confidence: Option<f64>,
    pub store_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub embedding_dimension: usize,
    pub allow_threshold: f64,
    pub deny_threshold: f64,
    pub window: Duration,
    pub min_samples: usize,
    pub agreement_ratio: f64,
    pub unlock_confidence_threshold: f64,
    pub max_attempts: u32,
    pub attempt_window: Duration,
    pub cooldown: Duration,
    pub min_detection_confidence: f64,
    pub store_path: PathBuf,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self {
            embedding_dimension: raw
                .embedding_dimension
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSION)
                .max(1),
            allow_threshold: unit(raw.allow_threshold, DEFAULT_ALLOW_THRESHOLD),
            deny_threshold: unit(raw.deny_threshold, DEFAULT_DENY_THRESHOLD),
            window: Duration::from_millis(
                raw.window_millis.unwrap_or(DEFAULT_WINDOW_MILLIS).max(1),
            ),
            min_samples: raw.min_samples.unwrap_or(DEFAULT_MIN_SAMPLES).max(1),
            agreement_ratio: unit(raw.agreement_ratio, DEFAULT_AGREEMENT_RATIO),
            unlock_confidence_threshold: unit(
                raw.unlock_confidence_threshold,
                DEFAULT_UNLOCK_CONFIDENCE_THRESHOLD,
            ),
            max_attempts: raw.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1),
            attempt_window: Duration::from_secs(
                raw.attempt_window_secs
                    .unwrap_or(DEFAULT_ATTEMPT_WINDOW_SECS)
                    .clamp(1, MAX_DURATION_SECS),
            ),
            cooldown: Duration::from_secs(
                raw.cooldown_secs
                    .unwrap_or(DEFAULT_COOLDOWN_SECS)
                    .clamp(1, MAX_DURATION_SECS),
            ),
            min_detection_confidence: unit(
                raw.min_detection_confidence,
                DEFAULT_MIN_DETECTION_CONFIDENCE,
            ),
            store_path: raw
                .store_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_raw(ConfigFile::default())
    }
}

fn unit(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => default,
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

impl LoadedConfig {
    pub fn new(contents: ConfigFile, source: PathBuf) -> Self {
        Self { contents, source }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

pub fn default_paths() -> [PathBuf; 2] {
    [
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ]
}

pub fn load_resolved_config() -> Result<ResolvedConfigWithSource, ConfigError> {
    load_resolved_from_paths(&default_paths())
}

pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed =
                    toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                return Ok(Some(LoadedConfig::new(parsed, path.clone())));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: err,
                })
            }
        }
    }

    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    match load_from_paths(paths)? {
        Some(entry) => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::from_raw(entry.contents),
            source: Some(entry.source),
        }),
        None => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::default(),
            source: None,
        }),
    }
}
