use std::fs;
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use facegate_core::faces::{
    EmbeddingVector, FaceDatabase, FaceMatcher, FilesystemRecordStore, ListKind, LoadOutcome,
    MatchVerdict,
};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
struct EmbeddingFile {
    embedding: Vec<f32>,
}

/// Reads `{"embedding": [..]}` from disk.
pub fn read_embedding_file(path: &Path) -> AppResult<EmbeddingVector> {
    let contents = fs::read_to_string(path).map_err(|source| AppError::ProbeRead {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: EmbeddingFile =
        serde_json::from_str(&contents).map_err(|err| AppError::InvalidProbeFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    EmbeddingVector::new(parsed.embedding)
}

/// Opens the store at `store_path` and loads it into a database fixed to
/// `dimension`. A missing store file yields an empty database.
pub fn open_database(
    store_path: &Path,
    dimension: usize,
) -> AppResult<(FaceDatabase, FilesystemRecordStore)> {
    let store = FilesystemRecordStore::new(store_path);
    let database = FaceDatabase::with_dimension(dimension);
    if let LoadOutcome::NothingStored = database.load(&store)? {
        tracing::debug!(
            target: "facegate.cli",
            path = %store_path.display(),
            "face store is empty"
        );
    }
    Ok((database, store))
}

#[derive(Debug, Clone)]
pub struct FaceEnrollmentConfig {
    pub label: String,
    pub list_kind: ListKind,
    pub embedding: PathBuf,
    pub store_path: PathBuf,
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceEnrollmentOutcome {
    pub label: String,
    pub list_kind: ListKind,
    pub store_path: PathBuf,
    pub embedding_dimension: usize,
    pub total_records: usize,
}

pub fn run_face_enrollment(config: &FaceEnrollmentConfig) -> AppResult<FaceEnrollmentOutcome> {
    let embedding = read_embedding_file(&config.embedding)?;
    let embedding_dimension = embedding.dimension();
    let (database, store) = open_database(&config.store_path, config.dimension)?;

    match config.list_kind {
        ListKind::Allow => database.add_face(embedding, &config.label)?,
        ListKind::Deny => database.add_to_deny_list(embedding, &config.label)?,
    }
    let total_records = database.save(&store)?;

    Ok(FaceEnrollmentOutcome {
        label: config.label.clone(),
        list_kind: config.list_kind,
        store_path: config.store_path.clone(),
        embedding_dimension,
        total_records,
    })
}

#[derive(Debug, Clone)]
pub struct FaceRemovalConfig {
    pub label: String,
    pub store_path: PathBuf,
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceRemovalOutcome {
    pub label: String,
    pub removed: usize,
    pub store_path: PathBuf,
}

pub fn run_face_removal(config: &FaceRemovalConfig) -> AppResult<FaceRemovalOutcome> {
    let (database, store) = open_database(&config.store_path, config.dimension)?;
    let removed = database.remove_face(&config.label);
    if removed == 0 {
        return Err(AppError::LabelNotFound {
            label: config.label.clone(),
        });
    }
    database.save(&store)?;

    Ok(FaceRemovalOutcome {
        label: config.label.clone(),
        removed,
        store_path: config.store_path.clone(),
    })
}

#[derive(Debug, Clone)]
pub struct FaceListConfig {
    pub store_path: PathBuf,
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceListEntry {
    pub label: String,
    pub list_kind: ListKind,
    pub embedding_dimension: usize,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceListOutcome {
    pub store_path: PathBuf,
    pub records: Vec<FaceListEntry>,
}

pub fn run_face_list(config: &FaceListConfig) -> AppResult<FaceListOutcome> {
    let (database, _store) = open_database(&config.store_path, config.dimension)?;
    let records = database
        .records()
        .iter()
        .map(|record| FaceListEntry {
            label: record.label().to_string(),
            list_kind: record.list_kind(),
            embedding_dimension: record.embedding().dimension(),
            created_at: record
                .created_at()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        })
        .collect();

    Ok(FaceListOutcome {
        store_path: config.store_path.clone(),
        records,
    })
}

#[derive(Debug, Clone)]
pub struct FaceMatchConfig {
    pub probe: PathBuf,
    pub store_path: PathBuf,
    pub dimension: usize,
    pub matcher: FaceMatcher,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceMatchOutcome {
    pub probe: PathBuf,
    pub allow_threshold: f64,
    pub deny_threshold: f64,
    #[serde(flatten)]
    pub verdict: MatchVerdict,
}

pub fn run_face_match(config: &FaceMatchConfig) -> AppResult<FaceMatchOutcome> {
    let probe = read_embedding_file(&config.probe)?;
    let (database, _store) = open_database(&config.store_path, config.dimension)?;
    let verdict = config.matcher.match_probe(&probe, &database)?;

    Ok(FaceMatchOutcome {
        probe: config.probe.clone(),
        allow_threshold: config.matcher.allow_threshold,
        deny_threshold: config.matcher.deny_threshold,
        verdict,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn embedding_file_errors_are_classified() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            read_embedding_file(&missing).unwrap_err(),
            AppError::ProbeRead { .. }
        ));

        let wrong_shape = dir.path().join("wrong.json");
        fs::write(&wrong_shape, r#"{"vector": [1.0]}"#).unwrap();
        assert!(matches!(
            read_embedding_file(&wrong_shape).unwrap_err(),
            AppError::InvalidProbeFile { .. }
        ));

        let zero = dir.path().join("zero.json");
        fs::write(&zero, r#"{"embedding": [0.0, 0.0]}"#).unwrap();
        assert!(matches!(
            read_embedding_file(&zero).unwrap_err(),
            AppError::MalformedEmbedding { .. }
        ));
    }

    #[test]
    fn missing_store_opens_empty() {
        let dir = tempdir().unwrap();
        let (database, store) = open_database(&dir.path().join("faces.json"), 3).unwrap();
        assert!(database.is_empty());
        assert_eq!(database.dimension(), Some(3));
        assert_eq!(store.path(), dir.path().join("faces.json"));
    }
}
