use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("embedding dimension mismatch: expected {expected} values, found {found}")]
    InvalidEmbedding { expected: usize, found: usize },

    #[error("embedding rejected: {message}")]
    MalformedEmbedding { message: String },

    #[error("invalid label '{label}': {message}")]
    InvalidLabel { label: String, message: String },

    #[error("face store is corrupt: {message}")]
    CorruptStore { message: String },

    #[error("failed to read face store {path}: {source}")]
    StoreRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write face store {path}: {source}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unlock actuator failed: {message}")]
    ActuatorFailure { message: String },

    #[error("failed to read probe file {path}: {source}")]
    ProbeRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("probe file {path} is invalid: {message}")]
    InvalidProbeFile { path: PathBuf, message: String },

    #[error("no record labelled '{label}' found")]
    LabelNotFound { label: String },

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            AppError::InvalidEmbedding { .. } => ExitCode::from(2),
            AppError::MalformedEmbedding { .. } => ExitCode::from(2),
            AppError::InvalidLabel { .. } => ExitCode::from(2),
            AppError::ProbeRead { .. } => ExitCode::from(2),
            AppError::InvalidProbeFile { .. } => ExitCode::from(2),
            AppError::ConfigRead { .. } => ExitCode::from(2),
            AppError::ConfigParse { .. } => ExitCode::from(2),
            AppError::CorruptStore { .. } => ExitCode::from(3),
            AppError::StoreRead { .. } => ExitCode::from(3),
            AppError::LabelNotFound { .. } => ExitCode::from(4),
            _ => ExitCode::from(1),
        }
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}

pub type AppResult<T> = Result<T, AppError>;
