//! Storage backend abstraction for the control-plane stores.
//!
//! All durable state (manifest store, evidence ledger, storage plane) is
//! written through this contract:
//! - Conditional writes with preconditions (CAS)
//! - Object metadata including `last_modified` and an opaque version token
//! - Prefix listing
//!
//! Two backends ship with the core: an in-memory backend for tests and a
//! local-filesystem backend for the POC deployment. The version token is an
//! opaque `String`; backends interpret it according to their own semantics.
//! Conditional writes are what keep the deploy sequence
//! (hash-compare-then-write) and the evidence read-merge-write sequence free
//! of lost updates within a process.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{Error, Result};

/// Precondition for conditional writes (CAS operations).
#[derive(Debug, Clone)]
pub enum WritePrecondition {
    /// Write only if the object does not exist.
    DoesNotExist,
    /// Write only if the object's version matches the given token.
    MatchesVersion(String),
    /// Write unconditionally.
    None,
}

/// Result of a conditional write.
#[derive(Debug, Clone)]
pub enum WriteResult {
    /// Write succeeded, returns the new version token.
    Success {
        /// The new version token after the write.
        version: String,
    },
    /// Precondition failed, returns the current version token.
    PreconditionFailed {
        /// The current version that caused the precondition to fail.
        current_version: String,
    },
}

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Object path (key), relative to the backend root.
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Opaque version token for CAS operations.
    pub version: String,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Storage backend trait for control-plane stores.
///
/// The contract is designed around object-storage semantics even though the
/// POC backend is a local directory; this keeps the store code portable to a
/// real object store without touching the callers.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads an entire object.
    ///
    /// Returns [`Error::NotFound`] if the object doesn't exist.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Writes with an optional precondition.
    ///
    /// Returns `WriteResult::PreconditionFailed` if the precondition is not
    /// met. Precondition failure is a normal result, never an error.
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult>;

    /// Deletes an object. Succeeds even if the object doesn't exist.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Lists objects with the given prefix.
    ///
    /// **Ordering**: results come back in arbitrary order. Callers needing
    /// deterministic order must sort.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Gets object metadata without reading content.
    ///
    /// Returns `None` if the object doesn't exist.
    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>>;
}

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory storage backend for testing.
///
/// Thread-safe via `RwLock`. Uses numeric versions internally (stored as
/// strings) to exercise the same CAS paths the filesystem backend uses.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    version: i64,
    last_modified: DateTime<Utc>,
}

impl MemoryBackend {
    /// Creates a new empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        objects
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let mut objects = self.objects.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        let current = objects.get(path);

        match precondition {
            WritePrecondition::DoesNotExist => {
                if let Some(obj) = current {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: obj.version.to_string(),
                    });
                }
            }
            WritePrecondition::MatchesVersion(expected) => {
                let expected_num: i64 = expected.parse().unwrap_or(-1);
                match current {
                    Some(obj) if obj.version != expected_num => {
                        return Ok(WriteResult::PreconditionFailed {
                            current_version: obj.version.to_string(),
                        });
                    }
                    None => {
                        return Ok(WriteResult::PreconditionFailed {
                            current_version: "0".to_string(),
                        });
                    }
                    _ => {}
                }
            }
            WritePrecondition::None => {}
        }

        let new_version = current.map_or(1, |o| o.version + 1);
        objects.insert(
            path.to_string(),
            StoredObject {
                data,
                version: new_version,
                last_modified: Utc::now(),
            },
        );
        drop(objects);

        Ok(WriteResult::Success {
            version: new_version.to_string(),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(path, obj)| ObjectMeta {
                path: path.clone(),
                size: obj.data.len() as u64,
                version: obj.version.to_string(),
                last_modified: Some(obj.last_modified),
            })
            .collect())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects.get(path).map(|obj| ObjectMeta {
            path: path.to_string(),
            size: obj.data.len() as u64,
            version: obj.version.to_string(),
            last_modified: Some(obj.last_modified),
        }))
    }
}

// ============================================================================
// LocalFsBackend
// ============================================================================

/// Local-filesystem storage backend.
///
/// The POC deployment target: all stores live under one root directory.
/// Writes go through a temp-file-and-rename sequence and are serialized by a
/// process-wide mutex, so the CAS contract holds for every writer in this
/// process. Version tokens are per-path generation counters held in memory;
/// a file that predates the process is assigned generation 1 on first
/// contact.
pub struct LocalFsBackend {
    root: PathBuf,
    generations: Mutex<HashMap<String, i64>>,
}

impl LocalFsBackend {
    /// Creates a backend rooted at the given directory.
    ///
    /// The directory is created lazily on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            generations: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the backend's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.starts_with('/') || path.starts_with('\\') {
            return Err(Error::InvalidInput(format!(
                "storage paths must be relative: {path}"
            )));
        }
        if path.split('/').any(|seg| seg == "..") {
            return Err(Error::InvalidInput(format!(
                "path traversal not allowed: {path}"
            )));
        }
        Ok(self.root.join(path))
    }

    fn meta_for(&self, path: &str, generation: i64) -> Result<Option<ObjectMeta>> {
        let full = self.resolve(path)?;
        match std::fs::metadata(&full) {
            Ok(meta) => {
                let last_modified = meta.modified().ok().map(DateTime::<Utc>::from);
                Ok(Some(ObjectMeta {
                    path: path.to_string(),
                    size: meta.len(),
                    version: generation.to_string(),
                    last_modified,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage_with_source(
                format!("failed to stat {path}"),
                e,
            )),
        }
    }

    fn write_atomic(&self, full: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::storage_with_source(format!("failed to create {}", parent.display()), e)
            })?;
        }
        let tmp = full.with_extension("tmp-write");
        std::fs::write(&tmp, data).map_err(|e| {
            Error::storage_with_source(format!("failed to write {}", tmp.display()), e)
        })?;
        std::fs::rename(&tmp, full).map_err(|e| {
            Error::storage_with_source(format!("failed to commit {}", full.display()), e)
        })
    }

    fn relative_key(&self, full: &Path) -> Option<String> {
        full.strip_prefix(&self.root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }
}

#[async_trait]
impl StorageBackend for LocalFsBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path)?;
        match std::fs::read(&full) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("object not found: {path}")))
            }
            Err(e) => Err(Error::storage_with_source(
                format!("failed to read {path}"),
                e,
            )),
        }
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let full = self.resolve(path)?;

        // Single write lock: the check-then-write sequence below must not
        // interleave with another writer in this process.
        let mut generations = self.generations.lock().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        let exists = full.exists();
        let current = if exists {
            Some(*generations.entry(path.to_string()).or_insert(1))
        } else {
            None
        };

        match precondition {
            WritePrecondition::DoesNotExist => {
                if let Some(version) = current {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: version.to_string(),
                    });
                }
            }
            WritePrecondition::MatchesVersion(expected) => {
                let expected_num: i64 = expected.parse().unwrap_or(-1);
                match current {
                    Some(version) if version != expected_num => {
                        return Ok(WriteResult::PreconditionFailed {
                            current_version: version.to_string(),
                        });
                    }
                    None => {
                        return Ok(WriteResult::PreconditionFailed {
                            current_version: "0".to_string(),
                        });
                    }
                    _ => {}
                }
            }
            WritePrecondition::None => {}
        }

        self.write_atomic(&full, &data)?;
        let new_version = current.map_or(1, |v| v + 1);
        generations.insert(path.to_string(), new_version);

        Ok(WriteResult::Success {
            version: new_version.to_string(),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match std::fs::remove_file(&full) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::storage_with_source(
                    format!("failed to delete {path}"),
                    e,
                ));
            }
        }
        if let Ok(mut generations) = self.generations.lock() {
            generations.remove(path);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(Error::storage_with_source(
                        format!("failed to list {}", dir.display()),
                        e,
                    ));
                }
            };

            for entry in entries {
                let entry = entry.map_err(|e| Error::storage_with_source("readdir failed", e))?;
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let Some(key) = self.relative_key(&path) else {
                    continue;
                };
                if !key.starts_with(prefix) || key.ends_with(".tmp-write") {
                    continue;
                }
                let generation = {
                    let mut generations = self.generations.lock().map_err(|_| Error::Internal {
                        message: "lock poisoned".into(),
                    })?;
                    *generations.entry(key.clone()).or_insert(1)
                };
                if let Some(meta) = self.meta_for(&key, generation)? {
                    results.push(meta);
                }
            }
        }

        Ok(results)
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Ok(None);
        }
        let generation = {
            let mut generations = self.generations.lock().map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?;
            *generations.entry(path.to_string()).or_insert(1)
        };
        self.meta_for(path, generation)
    }
}
