use std::collections::HashSet;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};
use crate::faces::embedding::EmbeddingVector;
use crate::faces::store::{RecordStore, StoredDatabase, StoredRecord, STORE_METRIC, STORE_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Allow,
    Deny,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListKind::Allow => f.write_str("allow"),
            ListKind::Deny => f.write_str("deny"),
        }
    }
}

/// An enrolled embedding. Records are never edited in place; re-adding the
/// same label to the same list replaces the record.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceRecord {
    label: String,
    embedding: EmbeddingVector,
    list_kind: ListKind,
    created_at: DateTime<Utc>,
}

impl FaceRecord {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn embedding(&self) -> &EmbeddingVector {
        &self.embedding
    }

    pub fn list_kind(&self) -> ListKind {
        self.list_kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearestMatch {
    pub label: String,
    pub list_kind: ListKind,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidates {
    pub deny: Option<NearestMatch>,
    pub allow: Option<NearestMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { records: usize },
    /// The store holds no payload yet; in-memory records were left as they were.
    NothingStored,
}

#[derive(Debug, Default)]
struct RecordSet {
    dimension: Option<usize>,
    // Insertion order; later entries are more recent.
    records: Vec<FaceRecord>,
}

/// Allow-list and deny-list embeddings guarded by a shared-read /
/// exclusive-write lock.
#[derive(Debug, Default)]
pub struct FaceDatabase {
    configured_dimension: Option<usize>,
    inner: RwLock<RecordSet>,
}

impl FaceDatabase {
    /// A database whose dimension is fixed by the first insert.
    pub fn new() -> Self {
        Self::default()
    }

    /// A database that only accepts embeddings of `dimension` values.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            configured_dimension: Some(dimension),
            inner: RwLock::new(RecordSet {
                dimension: Some(dimension),
                records: Vec::new(),
            }),
        }
    }

    pub fn add_face(&self, embedding: EmbeddingVector, label: &str) -> AppResult<()> {
        self.insert(embedding, label, ListKind::Allow)
    }

    pub fn add_to_deny_list(&self, embedding: EmbeddingVector, label: &str) -> AppResult<()> {
        self.insert(embedding, label, ListKind::Deny)
    }

    /// Removes `label` from both lists and returns how many records went away.
    pub fn remove_face(&self, label: &str) -> usize {
        let mut set = self.write();
        let before = set.records.len();
        set.records.retain(|record| record.label != label);
        let removed = before - set.records.len();
        if removed > 0 {
            info!(target: "facegate.db", label, removed, "removed face records");
        }
        removed
    }

    /// Highest-similarity record of `list_kind` scoring at least `threshold`.
    /// Ties go to the most recently added record.
    pub fn find_nearest(
        &self,
        probe: &EmbeddingVector,
        list_kind: ListKind,
        threshold: f64,
    ) -> AppResult<Option<NearestMatch>> {
        Ok(self
            .best_match(probe, list_kind)?
            .filter(|candidate| candidate.similarity >= threshold))
    }

    /// Highest-similarity record of `list_kind` regardless of threshold.
    pub fn best_match(
        &self,
        probe: &EmbeddingVector,
        list_kind: ListKind,
    ) -> AppResult<Option<NearestMatch>> {
        best_in(&self.read(), probe, list_kind)
    }

    /// Best deny-list and allow-list candidates taken from one snapshot, so a
    /// concurrent load cannot split them across two record sets.
    pub fn best_candidates(&self, probe: &EmbeddingVector) -> AppResult<Candidates> {
        let set = self.read();
        Ok(Candidates {
            deny: best_in(&set, probe, ListKind::Deny)?,
            allow: best_in(&set, probe, ListKind::Allow)?,
        })
    }

    pub fn records(&self) -> Vec<FaceRecord> {
        self.read().records.clone()
    }

    pub fn contains(&self, label: &str, list_kind: ListKind) -> bool {
        self.read()
            .records
            .iter()
            .any(|record| record.label == label && record.list_kind == list_kind)
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> Option<usize> {
        self.read().dimension
    }

    /// Serializes the full record set and hands it to `store`.
    pub fn save<S: RecordStore>(&self, store: &S) -> AppResult<usize> {
        // Exclusive so saves never interleave with each other or with load.
        let set = self.write();
        let payload = StoredDatabase {
            version: STORE_VERSION,
            metric: STORE_METRIC.to_string(),
            dimension: set.dimension,
            records: set
                .records
                .iter()
                .map(|record| StoredRecord {
                    label: record.label.clone(),
                    list_kind: record.list_kind,
                    embedding_dimension: record.embedding.dimension(),
                    embedding: record.embedding.as_slice().to_vec(),
                    created_at: record.created_at,
                })
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&payload)?;
        store.write(&bytes)?;
        debug!(target: "facegate.db", records = set.records.len(), "saved face database");
        Ok(set.records.len())
    }

    /// Replaces every in-memory record with the contents of `store`.
    ///
    /// The payload is fully validated before the swap; on any error the prior
    /// records stay in place.
    pub fn load<S: RecordStore>(&self, store: &S) -> AppResult<LoadOutcome> {
        let mut set = self.write();
        let Some(bytes) = store.read()? else {
            debug!(target: "facegate.db", "face store empty; keeping in-memory records");
            return Ok(LoadOutcome::NothingStored);
        };

        let stored: StoredDatabase =
            serde_json::from_slice(&bytes).map_err(|err| AppError::CorruptStore {
                message: format!("payload is not a valid face store: {err}"),
            })?;
        let restored = restore(stored, self.configured_dimension)?;
        let count = restored.records.len();
        *set = restored;
        info!(target: "facegate.db", records = count, "loaded face database");
        Ok(LoadOutcome::Loaded { records: count })
    }

    fn insert(&self, embedding: EmbeddingVector, label: &str, list_kind: ListKind) -> AppResult<()> {
        validate_label(label)?;

        let mut set = self.write();
        match set.dimension {
            Some(dimension) => embedding.ensure_dimension(dimension)?,
            None => set.dimension = Some(embedding.dimension()),
        }

        let before = set.records.len();
        set.records
            .retain(|record| !(record.label == label && record.list_kind == list_kind));
        let replaced = set.records.len() != before;
        set.records.push(FaceRecord {
            label: label.to_string(),
            embedding,
            list_kind,
            created_at: Utc::now(),
        });
        info!(target: "facegate.db", label, list = %list_kind, replaced, "stored face record");
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, RecordSet> {
        // The set is only ever replaced wholesale, so a poisoned guard still
        // holds a consistent value.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RecordSet> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn best_in(
    set: &RecordSet,
    probe: &EmbeddingVector,
    list_kind: ListKind,
) -> AppResult<Option<NearestMatch>> {
    if let Some(dimension) = set.dimension {
        probe.ensure_dimension(dimension)?;
    }

    let mut best: Option<(f64, &FaceRecord)> = None;
    for record in set.records.iter().filter(|r| r.list_kind == list_kind) {
        let similarity = probe.similarity(&record.embedding);
        if best.map_or(true, |(current, _)| similarity >= current) {
            best = Some((similarity, record));
        }
    }

    Ok(best.map(|(similarity, record)| NearestMatch {
        label: record.label.clone(),
        list_kind,
        similarity,
    }))
}

pub fn validate_label(label: &str) -> AppResult<()> {
    if label.trim().is_empty() {
        return Err(AppError::InvalidLabel {
            label: label.to_string(),
            message: "label cannot be empty".into(),
        });
    }

    if label.chars().any(char::is_control) {
        return Err(AppError::InvalidLabel {
            label: label.escape_default().to_string(),
            message: "label cannot contain control characters".into(),
        });
    }

    Ok(())
}

fn restore(stored: StoredDatabase, configured: Option<usize>) -> AppResult<RecordSet> {
    let corrupt = |message: String| AppError::CorruptStore { message };

    if stored.version != STORE_VERSION {
        return Err(corrupt(format!(
            "unsupported face store version {} (expected {STORE_VERSION})",
            stored.version
        )));
    }
    if stored.metric != STORE_METRIC {
        return Err(corrupt(format!(
            "unsupported similarity metric '{}'",
            stored.metric
        )));
    }

    let dimension = match (stored.dimension, configured) {
        (Some(found), Some(expected)) if found != expected => {
            return Err(corrupt(format!(
                "store dimension {found} does not match configured dimension {expected}"
            )));
        }
        (found, expected) => found.or(expected),
    };
    if dimension.is_none() && !stored.records.is_empty() {
        return Err(corrupt("store holds records but no dimension".into()));
    }

    let mut seen = HashSet::with_capacity(stored.records.len());
    let mut records = Vec::with_capacity(stored.records.len());
    for (idx, entry) in stored.records.into_iter().enumerate() {
        if entry.embedding.len() != entry.embedding_dimension
            || Some(entry.embedding_dimension) != dimension
        {
            return Err(corrupt(format!(
                "record {idx} ('{}') declares {} values, holds {}, store dimension {:?}",
                entry.label,
                entry.embedding_dimension,
                entry.embedding.len(),
                dimension
            )));
        }
        validate_label(&entry.label).map_err(|err| corrupt(format!("record {idx}: {err}")))?;
        let embedding = EmbeddingVector::new(entry.embedding)
            .map_err(|err| corrupt(format!("record {idx} ('{}'): {err}", entry.label)))?;
        if !seen.insert((entry.label.clone(), entry.list_kind)) {
            return Err(corrupt(format!(
                "duplicate {} record for label '{}'",
                entry.list_kind, entry.label
            )));
        }

        records.push(FaceRecord {
            label: entry.label,
            embedding,
            list_kind: entry.list_kind,
            created_at: entry.created_at,
        });
    }

    Ok(RecordSet { dimension, records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::store::MemoryRecordStore;

    fn vector(values: &[f32]) -> EmbeddingVector {
        EmbeddingVector::new(values.to_vec()).unwrap()
    }

    #[test]
    fn first_insert_fixes_dimension() {
        let db = FaceDatabase::new();
        db.add_face(vector(&[1.0, 0.0, 0.0]), "alice").unwrap();
        assert_eq!(db.dimension(), Some(3));

        let err = db.add_to_deny_list(vector(&[1.0, 0.0]), "mallory").unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidEmbedding {
                expected: 3,
                found: 2
            }
        ));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn configured_dimension_rejects_first_insert() {
        let db = FaceDatabase::with_dimension(4);
        let err = db.add_face(vector(&[1.0, 0.0]), "alice").unwrap_err();
        assert!(matches!(err, AppError::InvalidEmbedding { .. }));
        assert!(db.is_empty());
    }

    #[test]
    fn re_adding_replaces_record() {
        let db = FaceDatabase::new();
        db.add_face(vector(&[1.0, 0.0]), "alice").unwrap();
        db.add_face(vector(&[0.0, 1.0]), "alice").unwrap();

        let records = db.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].embedding().as_slice(), &[0.0, 1.0]);
    }

    #[test]
    fn same_label_may_sit_on_both_lists() {
        let db = FaceDatabase::new();
        db.add_face(vector(&[1.0, 0.0]), "bob").unwrap();
        db.add_to_deny_list(vector(&[1.0, 0.0]), "bob").unwrap();
        assert!(db.contains("bob", ListKind::Allow));
        assert!(db.contains("bob", ListKind::Deny));

        assert_eq!(db.remove_face("bob"), 2);
        assert!(db.is_empty());
        assert_eq!(db.remove_face("bob"), 0);
    }

    #[test]
    fn nearest_respects_threshold_and_list() {
        let db = FaceDatabase::new();
        db.add_face(vector(&[1.0, 0.0]), "alice").unwrap();
        db.add_face(vector(&[0.6, 0.8]), "carol").unwrap();
        db.add_to_deny_list(vector(&[0.0, 1.0]), "mallory").unwrap();

        let probe = vector(&[0.9, 0.1]);
        let hit = db
            .find_nearest(&probe, ListKind::Allow, 0.9)
            .unwrap()
            .expect("allow hit expected");
        assert_eq!(hit.label, "alice");
        assert!(db.find_nearest(&probe, ListKind::Deny, 0.5).unwrap().is_none());
        assert!(db
            .find_nearest(&probe, ListKind::Allow, 0.9999)
            .unwrap()
            .is_none());
    }

    #[test]
    fn ties_go_to_most_recent_record() {
        let db = FaceDatabase::new();
        db.add_face(vector(&[1.0, 0.0]), "first").unwrap();
        db.add_face(vector(&[2.0, 0.0]), "second").unwrap();

        let hit = db
            .find_nearest(&vector(&[1.0, 0.0]), ListKind::Allow, 0.5)
            .unwrap()
            .unwrap();
        assert_eq!(hit.label, "second");

        db.add_face(vector(&[3.0, 0.0]), "first").unwrap();
        let hit = db
            .find_nearest(&vector(&[1.0, 0.0]), ListKind::Allow, 0.5)
            .unwrap()
            .unwrap();
        assert_eq!(hit.label, "first");
    }

    #[test]
    fn candidates_cover_both_lists() {
        let db = FaceDatabase::new();
        db.add_face(vector(&[1.0, 0.0]), "alice").unwrap();
        db.add_to_deny_list(vector(&[0.0, 1.0]), "mallory").unwrap();

        let candidates = db.best_candidates(&vector(&[1.0, 0.0])).unwrap();
        assert_eq!(candidates.allow.unwrap().label, "alice");
        let deny = candidates.deny.unwrap();
        assert_eq!(deny.label, "mallory");
        assert_eq!(deny.list_kind, ListKind::Deny);

        let empty = FaceDatabase::new()
            .best_candidates(&vector(&[1.0, 0.0]))
            .unwrap();
        assert!(empty.allow.is_none() && empty.deny.is_none());
        assert!(db.best_candidates(&vector(&[1.0, 0.0, 0.0])).is_err());
    }

    #[test]
    fn probe_dimension_mismatch_is_an_error() {
        let db = FaceDatabase::new();
        db.add_face(vector(&[1.0, 0.0]), "alice").unwrap();
        let err = db
            .find_nearest(&vector(&[1.0, 0.0, 0.0]), ListKind::Allow, 0.5)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidEmbedding { .. }));
    }

    #[test]
    fn labels_are_validated() {
        let db = FaceDatabase::new();
        assert!(matches!(
            db.add_face(vector(&[1.0]), "  "),
            Err(AppError::InvalidLabel { .. })
        ));
        assert!(matches!(
            db.add_face(vector(&[1.0]), "bad\nlabel"),
            Err(AppError::InvalidLabel { .. })
        ));
    }

    #[test]
    fn save_then_load_reproduces_records_in_order() {
        let db = FaceDatabase::new();
        db.add_face(vector(&[0.25, -0.5, 0.125]), "alice").unwrap();
        db.add_to_deny_list(vector(&[0.1, 0.2, 0.3]), "mallory").unwrap();
        db.add_face(vector(&[0.3, 0.3, 0.3]), "bob").unwrap();

        let store = MemoryRecordStore::new();
        assert_eq!(db.save(&store).unwrap(), 3);

        let restored = FaceDatabase::new();
        let outcome = restored.load(&store).unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { records: 3 });
        assert_eq!(restored.records(), db.records());
        assert_eq!(restored.dimension(), Some(3));
    }

    #[test]
    fn corrupt_payload_preserves_prior_state() {
        let db = FaceDatabase::new();
        db.add_face(vector(&[1.0, 0.0]), "alice").unwrap();

        let store = MemoryRecordStore::with_payload(&b"{\"version\": 1, \"records\": ["[..]);
        let err = db.load(&store).unwrap_err();
        assert!(matches!(err, AppError::CorruptStore { .. }));
        assert_eq!(db.len(), 1);
        assert!(db.contains("alice", ListKind::Allow));
    }

    #[test]
    fn load_rejects_unknown_version() {
        let db = FaceDatabase::new();
        let store = MemoryRecordStore::with_payload(
            &br#"{"version": 2, "metric": "cosine", "dimension": null, "records": []}"#[..],
        );
        assert!(matches!(
            db.load(&store),
            Err(AppError::CorruptStore { .. })
        ));
    }

    #[test]
    fn load_rejects_mismatched_record_dimension() {
        let payload = br#"{
            "version": 1,
            "metric": "cosine",
            "dimension": 3,
            "records": [
                {"label": "alice", "list_kind": "allow", "embedding_dimension": 3,
                 "embedding": [1.0, 0.0, 0.0], "created_at": "2024-01-01T00:00:00Z"},
                {"label": "bob", "list_kind": "allow", "embedding_dimension": 2,
                 "embedding": [1.0, 0.0], "created_at": "2024-01-01T00:00:01Z"}
            ]
        }"#;
        let db = FaceDatabase::new();
        db.add_face(vector(&[0.0, 1.0]), "carol").unwrap();

        let err = db.load(&MemoryRecordStore::with_payload(&payload[..])).unwrap_err();
        assert!(matches!(err, AppError::CorruptStore { .. }));
        assert!(db.contains("carol", ListKind::Allow));
        assert_eq!(db.dimension(), Some(2));
    }

    #[test]
    fn load_rejects_duplicate_records() {
        let payload = br#"{
            "version": 1,
            "metric": "cosine",
            "dimension": 2,
            "records": [
                {"label": "alice", "list_kind": "deny", "embedding_dimension": 2,
                 "embedding": [1.0, 0.0], "created_at": "2024-01-01T00:00:00Z"},
                {"label": "alice", "list_kind": "deny", "embedding_dimension": 2,
                 "embedding": [0.0, 1.0], "created_at": "2024-01-01T00:00:01Z"}
            ]
        }"#;
        let err = FaceDatabase::new()
            .load(&MemoryRecordStore::with_payload(&payload[..]))
            .unwrap_err();
        assert!(matches!(err, AppError::CorruptStore { .. }));
    }

    #[test]
    fn load_checks_configured_dimension() {
        let source = FaceDatabase::new();
        source.add_face(vector(&[1.0, 0.0]), "alice").unwrap();
        let store = MemoryRecordStore::new();
        source.save(&store).unwrap();

        let db = FaceDatabase::with_dimension(128);
        assert!(matches!(db.load(&store), Err(AppError::CorruptStore { .. })));
        assert_eq!(db.dimension(), Some(128));
    }

    #[test]
    fn empty_store_leaves_records_untouched() {
        let db = FaceDatabase::new();
        db.add_face(vector(&[1.0, 0.0]), "alice").unwrap();
        let outcome = db.load(&MemoryRecordStore::new()).unwrap();
        assert_eq!(outcome, LoadOutcome::NothingStored);
        assert_eq!(db.len(), 1);
    }
}
