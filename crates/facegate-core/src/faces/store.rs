use std::cell::RefCell;
use std::env;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::errors::{AppError, AppResult};
use crate::faces::database::ListKind;

pub const DEFAULT_STORE_PATH: &str = "/var/lib/facegate/faces.json";
pub const STORE_PATH_ENV: &str = "FACEGATE_STORE_PATH";
pub const STORE_VERSION: u32 = 1;
pub const STORE_METRIC: &str = "cosine";

/// Scoped byte-level persistence for the face database.
///
/// `read` returns `None` when nothing has been saved yet.
pub trait RecordStore {
    fn read(&self) -> AppResult<Option<Vec<u8>>>;
    fn write(&self, payload: &[u8]) -> AppResult<()>;
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    fn read(&self) -> AppResult<Option<Vec<u8>>> {
        (**self).read()
    }

    fn write(&self, payload: &[u8]) -> AppResult<()> {
        (**self).write(payload)
    }
}

#[derive(Debug, Clone)]
pub struct FilesystemRecordStore {
    path: PathBuf,
}

impl FilesystemRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for FilesystemRecordStore {
    fn read(&self) -> AppResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(AppError::StoreRead {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write(&self, payload: &[u8]) -> AppResult<()> {
        write_atomically(&self.path, payload)
    }
}

/// Resolves the store location: explicit override, then `$FACEGATE_STORE_PATH`,
/// then the configured path, then the built-in default.
pub fn resolve_store_path(override_path: Option<&Path>, configured: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        path.to_path_buf()
    } else if let Ok(env_value) = env::var(STORE_PATH_ENV) {
        PathBuf::from(env_value)
    } else if let Some(path) = configured {
        path.to_path_buf()
    } else {
        PathBuf::from(DEFAULT_STORE_PATH)
    }
}

fn write_atomically(path: &Path, payload: &[u8]) -> AppResult<()> {
    let write_err = |source| AppError::StoreWrite {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|source| AppError::StoreWrite {
        path: parent.to_path_buf(),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    {
        let file = tmp.as_file_mut();
        {
            let mut writer = BufWriter::new(&mut *file);
            writer.write_all(payload).map_err(write_err)?;
            writer.write_all(b"\n").map_err(write_err)?;
            writer.flush().map_err(write_err)?;
        }
        file.sync_all().map_err(write_err)?;
    }

    let file = tmp.persist(path).map_err(|err| write_err(err.error))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata().map_err(write_err)?.permissions();
        perms.set_mode(0o600);
        file.set_permissions(perms).map_err(write_err)?;
    }
    #[cfg(not(unix))]
    drop(file);

    Ok(())
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    payload: RefCell<Option<Vec<u8>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: RefCell::new(Some(payload.into())),
        }
    }

    pub fn payload(&self) -> Option<Vec<u8>> {
        self.payload.borrow().clone()
    }
}

impl RecordStore for MemoryRecordStore {
    fn read(&self) -> AppResult<Option<Vec<u8>>> {
        Ok(self.payload.borrow().clone())
    }

    fn write(&self, payload: &[u8]) -> AppResult<()> {
        *self.payload.borrow_mut() = Some(payload.to_vec());
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct StoredDatabase {
    pub version: u32,
    pub metric: String,
    pub dimension: Option<usize>,
    pub records: Vec<StoredRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct StoredRecord {
    pub label: String,
    pub list_kind: ListKind,
    pub embedding_dimension: usize,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}
