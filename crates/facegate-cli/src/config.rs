use std::path::{Path, PathBuf};

use facegate_config::{load_resolved_from_paths, ResolvedConfig};
use facegate_core::faces::{resolve_store_path, FaceMatcher};
use facegate_core::{GateConfig, SessionConfig, UnlockPolicy};

use crate::errors::{config_error, AppResult};

/// Everything a command needs after flags, environment and config file have
/// been merged.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub gate: GateConfig,
    pub embedding_dimension: usize,
    pub store_path: PathBuf,
    /// Config file the values came from, if one was found.
    pub source: Option<PathBuf>,
}

pub fn load_settings(store_override: Option<PathBuf>) -> AppResult<Settings> {
    load_settings_from_paths(store_override, &facegate_config::default_paths())
}

pub fn load_settings_from_paths(
    store_override: Option<PathBuf>,
    paths: &[PathBuf],
) -> AppResult<Settings> {
    let loaded = load_resolved_from_paths(paths).map_err(config_error)?;
    match &loaded.source {
        Some(path) => tracing::debug!(
            target: "facegate.cli",
            path = %path.display(),
            "loaded configuration"
        ),
        None => tracing::debug!(
            target: "facegate.cli",
            "no configuration file found; using defaults"
        ),
    }
    Ok(settings_from_resolved(
        &loaded.resolved,
        loaded.source,
        store_override.as_deref(),
    ))
}

pub fn settings_from_resolved(
    resolved: &ResolvedConfig,
    source: Option<PathBuf>,
    store_override: Option<&Path>,
) -> Settings {
    let gate = GateConfig {
        matcher: FaceMatcher::new(resolved.allow_threshold, resolved.deny_threshold),
        session: SessionConfig {
            window: resolved.window,
            min_samples: resolved.min_samples,
            agreement_ratio: resolved.agreement_ratio,
        },
        unlock: UnlockPolicy {
            unlock_confidence_threshold: resolved.unlock_confidence_threshold,
            max_attempts: resolved.max_attempts,
            attempt_window: resolved.attempt_window,
            cooldown: resolved.cooldown,
        },
        min_detection_confidence: resolved.min_detection_confidence,
    };

    Settings {
        gate,
        embedding_dimension: resolved.embedding_dimension,
        store_path: resolve_store_path(store_override, Some(resolved.store_path.as_path())),
        source,
    }
}
