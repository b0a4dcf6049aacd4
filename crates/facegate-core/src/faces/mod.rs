pub mod database;
pub mod embedding;
pub mod matcher;
pub mod provider;
pub mod store;

pub use database::{
    validate_label, Candidates, FaceDatabase, FaceRecord, ListKind, LoadOutcome,
    NearestMatch,
};

pub use embedding::{cosine_similarity, ensure_valid_embedding, EmbeddingVector};

pub use matcher::{
    match_probe, FaceMatcher, MatchOutcome, MatchVerdict, DEFAULT_ALLOW_THRESHOLD,
    DEFAULT_DENY_THRESHOLD,
};

pub use provider::{FaceDetection, FaceEmbeddingProvider, FaceObservation};

pub use store::{
    resolve_store_path, FilesystemRecordStore, MemoryRecordStore, RecordStore,
    DEFAULT_STORE_PATH, STORE_PATH_ENV, STORE_VERSION,
};
