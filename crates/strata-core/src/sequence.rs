//! Persistent monotonic sequence counters for artifact naming.
//!
//! Every store that names artifacts in creation order (raw envelopes, facts,
//! evidence records) owns a counter persisted as a small JSON file next to
//! the artifacts. Counters are instance state: tests and concurrent runs
//! construct their own `SequenceCounter` over their own backend; there is no
//! process-wide registry.
//!
//! Increment goes through a conditional write so two in-process writers can
//! never draw the same number.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::{StorageBackend, WritePrecondition, WriteResult};

/// Maximum CAS retries before giving up on a contended counter.
const MAX_RETRIES: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct SeqState {
    seq: u64,
}

/// A persistent, monotonically increasing counter bound to one file.
pub struct SequenceCounter {
    storage: Arc<dyn StorageBackend>,
    path: String,
}

impl SequenceCounter {
    /// Creates a counter persisted at `path` on the given backend.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, path: impl Into<String>) -> Self {
        Self {
            storage,
            path: path.into(),
        }
    }

    /// Returns the current sequence number without incrementing (0 if the
    /// counter file does not exist yet).
    ///
    /// # Errors
    ///
    /// Returns an error if the counter file exists but cannot be read or
    /// parsed.
    pub async fn current(&self) -> Result<u64> {
        match self.storage.get(&self.path).await {
            Ok(bytes) => parse_seq(&bytes, &self.path),
            Err(Error::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Allocates and returns the next sequence number (1-based).
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or the counter stays contended past
    /// the retry budget.
    pub async fn next(&self) -> Result<u64> {
        for _ in 0..MAX_RETRIES {
            let head = self.storage.head(&self.path).await?;

            let (next, precondition) = match &head {
                None => (1, WritePrecondition::DoesNotExist),
                Some(meta) => {
                    let bytes = self.storage.get(&self.path).await?;
                    let current = parse_seq(&bytes, &self.path)?;
                    (
                        current + 1,
                        WritePrecondition::MatchesVersion(meta.version.clone()),
                    )
                }
            };

            let body = serde_json::to_vec(&SeqState { seq: next })
                .map_err(|e| Error::serialization(format!("sequence state: {e}")))?;

            match self
                .storage
                .put(&self.path, Bytes::from(body), precondition)
                .await?
            {
                WriteResult::Success { .. } => return Ok(next),
                WriteResult::PreconditionFailed { .. } => {
                    // Another writer advanced the counter; re-read and retry.
                }
            }
        }

        Err(Error::PreconditionFailed {
            message: format!("sequence counter {} contended past retry budget", self.path),
        })
    }
}

fn parse_seq(bytes: &Bytes, path: &str) -> Result<u64> {
    let state: SeqState = serde_json::from_slice(bytes)
        .map_err(|e| Error::serialization(format!("corrupt sequence file {path}: {e}")))?;
    Ok(state.seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    #[tokio::test]
    async fn counter_starts_at_one() {
        let backend = Arc::new(MemoryBackend::new());
        let counter = SequenceCounter::new(backend, "store/.seq.json");

        assert_eq!(counter.current().await.unwrap(), 0);
        assert_eq!(counter.next().await.unwrap(), 1);
        assert_eq!(counter.next().await.unwrap(), 2);
        assert_eq!(counter.current().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn counters_are_isolated_per_path() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let a = SequenceCounter::new(Arc::clone(&backend), "a/.seq.json");
        let b = SequenceCounter::new(Arc::clone(&backend), "b/.seq.json");

        assert_eq!(a.next().await.unwrap(), 1);
        assert_eq!(a.next().await.unwrap(), 2);
        assert_eq!(b.next().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn two_counters_over_one_file_never_collide() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let a = SequenceCounter::new(Arc::clone(&backend), "shared/.seq.json");
        let b = SequenceCounter::new(Arc::clone(&backend), "shared/.seq.json");

        let mut seen = std::collections::HashSet::new();
        for _ in 0..5 {
            assert!(seen.insert(a.next().await.unwrap()));
            assert!(seen.insert(b.next().await.unwrap()));
        }
        assert_eq!(seen.len(), 10);
    }
}
