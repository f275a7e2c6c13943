//! The evidence ledger: UTID-addressed, append-only, sequence-named.
//!
//! Write discipline:
//! - the first write for a UTID allocates a sequenced file name
//!   (`<type>_<seq>_<manifest_id>_v<version>.json`) which is memoized on the
//!   ledger instance; subsequent updates merge into the same file
//! - merges never overwrite `created_at`
//! - every read-merge-write goes through a `MatchesVersion` conditional
//!   write, so a lost update cannot occur even with a second accidental
//!   writer for the same UTID
//!
//! The layer-specific writers ([`EvidenceLedger::write_semantic`],
//! [`EvidenceLedger::write_retrieval`]) accept failure payloads without
//! raising: at this boundary failures are recorded, not thrown.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use ulid::Ulid;

use strata_core::storage::{StorageBackend, WritePrecondition, WriteResult};
use strata_core::{Error as CoreError, Layer, SequenceCounter, StorePaths, Utid};

use crate::error::{LedgerError, Result};
use crate::record::{Bom, ComponentRun, EvidenceRecord, ExecutionStatus, RecordType};

/// Retry budget for the read-merge-write CAS loop.
const MERGE_RETRIES: usize = 16;

/// The evidence ledger.
///
/// The UTID-to-filename memo is instance state: concurrent runs and tests
/// construct isolated ledgers over their own backends.
pub struct EvidenceLedger {
    storage: Arc<dyn StorageBackend>,
    filenames: Mutex<HashMap<Utid, String>>,
}

/// Extra fields merged in by a status update.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    /// The new status.
    pub status: Option<ExecutionStatus>,
    /// Engine that is executing.
    pub engine: Option<String>,
    /// Engine version.
    pub engine_version: Option<String>,
    /// Manifest version, once resolved.
    pub manifest_version: Option<String>,
    /// Document id, once source binding completes.
    pub doc_id: Option<String>,
    /// Error message on failure.
    pub error: Option<String>,
}

impl StatusUpdate {
    /// Creates an update transitioning to `status`.
    #[must_use]
    pub fn to(status: ExecutionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Attaches engine identity.
    #[must_use]
    pub fn with_engine(mut self, engine: &str, engine_version: &str) -> Self {
        self.engine = Some(engine.to_string());
        self.engine_version = Some(engine_version.to_string());
        self
    }

    /// Attaches the resolved manifest version.
    #[must_use]
    pub fn with_manifest_version(mut self, version: &str) -> Self {
        self.manifest_version = Some(version.to_string());
        self
    }

    /// Attaches the consumed document id.
    #[must_use]
    pub fn with_doc_id(mut self, doc_id: &str) -> Self {
        self.doc_id = Some(doc_id.to_string());
        self
    }

    /// Attaches a failure message.
    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Payload for a semantic evidence record.
#[derive(Debug, Clone)]
pub struct SemanticEvidence {
    /// The semantic execution UTID.
    pub utid: Utid,
    /// Document id inherited from the curation ancestry.
    pub doc_id: Option<String>,
    /// The semantic manifest.
    pub manifest_id: String,
    /// Its version.
    pub manifest_version: String,
    /// Upstream curation execution (the lineage link).
    pub curation_utid: Option<Utid>,
    /// The curation manifest referenced.
    pub source_manifest_ref: Option<String>,
    /// Semantic domain.
    pub domain: String,
    /// Engine identity.
    pub engine: String,
    /// Engine version.
    pub engine_version: String,
    /// Path of the projection output, if one was produced.
    pub output_path: Option<String>,
    /// Records projected.
    pub record_count: u64,
    /// Components executed.
    pub components: Vec<ComponentRun>,
    /// Terminal status (failures are recorded, not raised).
    pub status: ExecutionStatus,
    /// Error message when status is FAILURE.
    pub error: Option<String>,
}

/// Payload for a retrieval evidence record.
#[derive(Debug, Clone)]
pub struct RetrievalEvidence {
    /// The retrieval execution UTID.
    pub utid: Utid,
    /// Union of all ancestor document ids ("Trace Everything").
    pub doc_ids: Vec<String>,
    /// The retrieval manifest.
    pub manifest_id: String,
    /// Its version.
    pub manifest_version: String,
    /// Upstream semantic executions (the fan-in lineage links).
    pub semantic_utids: Vec<Utid>,
    /// The semantic manifests joined.
    pub source_manifests: Vec<String>,
    /// Output domain.
    pub domain: String,
    /// Engine identity.
    pub engine: String,
    /// Engine version.
    pub engine_version: String,
    /// Path of the retrieval output, if one was produced.
    pub output_path: Option<String>,
    /// Output format (json, json-ld, csv, ...).
    pub output_format: Option<String>,
    /// Records in the output.
    pub record_count: u64,
    /// Components executed.
    pub components: Vec<ComponentRun>,
    /// Terminal status (failures are recorded, not raised).
    pub status: ExecutionStatus,
    /// Error message when status is FAILURE.
    pub error: Option<String>,
}

/// Payload for a deployment evidence record.
#[derive(Debug, Clone)]
pub struct DeploymentEvidence {
    /// Manifest deployed.
    pub manifest_id: String,
    /// Version deployed.
    pub manifest_version: String,
    /// Content hash of the deployed manifest.
    pub content_hash: String,
    /// Layer deployed under.
    pub layer: Layer,
    /// Agency deployed under.
    pub agency: String,
    /// Where the manifest came from.
    pub source_path: Option<String>,
    /// Where the store placed it.
    pub target_path: String,
    /// Engine declared by the manifest.
    pub engine: Option<String>,
    /// Engine version declared by the manifest.
    pub engine_version: Option<String>,
    /// Deploy outcome.
    pub status: String,
    /// True when governance was overridden with `force`; the audit trail
    /// for administrative overrides.
    pub forced: bool,
}

/// A deployment evidence record as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Unique deployment identifier.
    pub deployment_id: String,
    /// Always `"deployment"`; distinguishes these files from execution
    /// records when scanning the store.
    pub record_type: RecordType,
    /// Manifest deployed.
    pub manifest_id: String,
    /// Version deployed.
    pub manifest_version: String,
    /// Content hash of the deployed manifest.
    pub content_hash: String,
    /// Layer deployed under.
    pub layer: Layer,
    /// Agency deployed under.
    pub agency: String,
    /// Engine declared by the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Engine version declared by the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    /// Where the manifest came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    /// Where the store placed it.
    pub target_path: String,
    /// Deploy outcome.
    pub status: String,
    /// True when governance was overridden with `force`.
    #[serde(default, skip_serializing_if = "crate::record::is_false")]
    pub forced: bool,
    /// Deployment timestamp.
    pub deployed_at: DateTime<Utc>,
    /// Record creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl EvidenceLedger {
    /// Creates a ledger over the given backend.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            filenames: Mutex::new(HashMap::new()),
        }
    }

    /// First write for a UTID: records intent to execute (`QUEUED`).
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn write_intent(
        &self,
        utid: Utid,
        layer: Layer,
        manifest_id: &str,
        manifest_version: &str,
        content_hash: &str,
    ) -> Result<()> {
        let hash = content_hash.to_string();
        self.upsert(utid, layer, manifest_id, manifest_version, move |record| {
            record.content_hash = Some(hash.clone());
            record.transition(ExecutionStatus::Queued);
        })
        .await
    }

    /// Records replay intent: like [`Self::write_intent`] but marking the
    /// record as a replay of `source_utid`.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn write_replay_intent(
        &self,
        utid: Utid,
        layer: Layer,
        manifest_id: &str,
        manifest_version: &str,
        content_hash: &str,
        source_utid: Utid,
    ) -> Result<()> {
        let hash = content_hash.to_string();
        self.upsert(utid, layer, manifest_id, manifest_version, move |record| {
            record.content_hash = Some(hash.clone());
            record.replay_mode = true;
            record.source_utid = Some(source_utid);
            record.transition(ExecutionStatus::Queued);
        })
        .await
    }

    /// Merges a status update into an existing record.
    ///
    /// Creates the record if absent (defensive; normal flows always write
    /// intent first). `created_at` is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn update_status(&self, utid: Utid, update: StatusUpdate) -> Result<()> {
        // Layer/manifest fall back to what the existing record already holds.
        self.upsert(utid, Layer::Curation, "unknown", "unknown", move |record| {
            if let Some(status) = update.status {
                record.transition(status);
            }
            if let Some(ref engine) = update.engine {
                record.engine = Some(engine.clone());
            }
            if let Some(ref engine_version) = update.engine_version {
                record.engine_version = Some(engine_version.clone());
            }
            if let Some(ref version) = update.manifest_version {
                record.manifest_version = version.clone();
            }
            if let Some(ref doc_id) = update.doc_id {
                record.doc_id = Some(doc_id.clone());
            }
            if let Some(ref error) = update.error {
                record.error = Some(error.clone());
            }
        })
        .await
    }

    /// Embeds the terminal BOM. Called once, at completion (success or
    /// failure).
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn write_bom(&self, utid: Utid, bom: Bom) -> Result<()> {
        self.upsert(utid, Layer::Curation, "unknown", "unknown", move |record| {
            record.bom = Some(bom.clone());
        })
        .await
    }

    /// Writes (or merges) a semantic evidence record.
    ///
    /// Failures arrive as `status = FAILURE` payloads and are recorded
    /// exactly like successes.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure only.
    pub async fn write_semantic(&self, evidence: SemanticEvidence) -> Result<()> {
        let SemanticEvidence {
            utid,
            doc_id,
            manifest_id,
            manifest_version,
            curation_utid,
            source_manifest_ref,
            domain,
            engine,
            engine_version,
            output_path,
            record_count,
            components,
            status,
            error,
        } = evidence;

        self.upsert(
            utid,
            Layer::Semantics,
            &manifest_id,
            &manifest_version,
            move |record| {
                record.doc_id.clone_from(&doc_id);
                record.curation_utid = curation_utid;
                record.source_manifest_ref.clone_from(&source_manifest_ref);
                record.domain = Some(domain.clone());
                record.engine = Some(engine.clone());
                record.engine_version = Some(engine_version.clone());
                record.output_path.clone_from(&output_path);
                record.record_count = Some(record_count);
                record.components.clone_from(&components);
                record.error.clone_from(&error);
                record.transition(status);
            },
        )
        .await
    }

    /// Writes (or merges) a retrieval evidence record.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure only.
    pub async fn write_retrieval(&self, evidence: RetrievalEvidence) -> Result<()> {
        let RetrievalEvidence {
            utid,
            doc_ids,
            manifest_id,
            manifest_version,
            semantic_utids,
            source_manifests,
            domain,
            engine,
            engine_version,
            output_path,
            output_format,
            record_count,
            components,
            status,
            error,
        } = evidence;

        self.upsert(
            utid,
            Layer::Retrieval,
            &manifest_id,
            &manifest_version,
            move |record| {
                record.doc_ids.clone_from(&doc_ids);
                record.semantic_utids.clone_from(&semantic_utids);
                record.source_manifests.clone_from(&source_manifests);
                record.domain = Some(domain.clone());
                record.engine = Some(engine.clone());
                record.engine_version = Some(engine_version.clone());
                record.output_path.clone_from(&output_path);
                record.output_format.clone_from(&output_format);
                record.record_count = Some(record_count);
                record.components.clone_from(&components);
                record.error.clone_from(&error);
                record.transition(status);
            },
        )
        .await
    }

    /// Writes a deployment evidence record.
    ///
    /// Returns the generated deployment id.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn write_deployment(&self, evidence: DeploymentEvidence) -> Result<String> {
        let deployment_id = format!("deploy-{}", Ulid::new());
        let now = Utc::now();

        let record = DeploymentRecord {
            deployment_id: deployment_id.clone(),
            record_type: RecordType::Deployment,
            manifest_id: evidence.manifest_id.clone(),
            manifest_version: evidence.manifest_version.clone(),
            content_hash: evidence.content_hash,
            layer: evidence.layer,
            agency: evidence.agency,
            engine: evidence.engine,
            engine_version: evidence.engine_version,
            source_path: evidence.source_path,
            target_path: evidence.target_path,
            status: evidence.status,
            forced: evidence.forced,
            deployed_at: now,
            created_at: now,
        };

        let seq = self.counter(RecordType::Deployment).next().await?;
        let filename = sequenced_filename(
            RecordType::Deployment,
            seq,
            &evidence.manifest_id,
            &evidence.manifest_version,
        );
        let body = serde_json::to_vec_pretty(&record).map_err(|e| LedgerError::Serialization {
            message: format!("deployment record: {e}"),
        })?;

        self.storage
            .put(
                &StorePaths::evidence_record(&filename),
                Bytes::from(body),
                WritePrecondition::DoesNotExist,
            )
            .await
            .map_err(LedgerError::from)?;

        tracing::info!(
            deployment_id = %deployment_id,
            manifest_id = %evidence.manifest_id,
            version = %evidence.manifest_version,
            forced = evidence.forced,
            "deployment evidence recorded"
        );
        Ok(deployment_id)
    }

    /// Reads the evidence record for a UTID, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a corrupt record.
    pub async fn read(&self, utid: Utid) -> Result<Option<EvidenceRecord>> {
        let Some(path) = self.locate(utid).await? else {
            return Ok(None);
        };
        match self.storage.get(&path).await {
            Ok(bytes) => Ok(Some(decode_record(&bytes, &path)?)),
            Err(CoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists every execution record in the ledger.
    ///
    /// Deployment records and unparseable files are skipped, not errors: the
    /// ledger outlives schema changes and a scan must not die on one stray
    /// file.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn list_all(&self) -> Result<Vec<EvidenceRecord>> {
        let mut records = Vec::new();
        for meta in self.storage.list(&StorePaths::evidence_prefix()).await? {
            if !is_execution_record_path(&meta.path) {
                continue;
            }
            let Ok(bytes) = self.storage.get(&meta.path).await else {
                continue;
            };
            if let Ok(record) = serde_json::from_slice::<EvidenceRecord>(&bytes) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Lists deployment records, optionally filtered by manifest id, newest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn list_deployments(
        &self,
        manifest_id: Option<&str>,
    ) -> Result<Vec<DeploymentRecord>> {
        let mut records = Vec::new();
        for meta in self.storage.list(&StorePaths::evidence_prefix()).await? {
            let Some(name) = meta.path.strip_prefix(&StorePaths::evidence_prefix()) else {
                continue;
            };
            if !name.starts_with("deploy_") || !name.ends_with(".json") {
                continue;
            }
            let Ok(bytes) = self.storage.get(&meta.path).await else {
                continue;
            };
            if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&bytes) {
                if manifest_id.map_or(true, |id| record.manifest_id == id) {
                    records.push(record);
                }
            }
        }
        records.sort_by(|a, b| b.deployed_at.cmp(&a.deployed_at));
        Ok(records)
    }

    /// Finds the earliest non-replay SUCCESS execution of a manifest
    /// version: the canonical original eligible for replay-by-version.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn find_first_success(
        &self,
        manifest_id: &str,
        version: &str,
    ) -> Result<Option<EvidenceRecord>> {
        let mut matching: Vec<EvidenceRecord> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|r| {
                r.manifest_id == manifest_id
                    && r.manifest_version == version
                    && r.status == ExecutionStatus::Success
                    && !r.replay_mode
            })
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching.into_iter().next())
    }

    /// Finds the most recent execution record, optionally filtered by
    /// record type.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn find_latest(
        &self,
        record_type: Option<RecordType>,
    ) -> Result<Option<EvidenceRecord>> {
        let mut latest: Option<EvidenceRecord> = None;
        for record in self.list_all().await? {
            if let Some(rt) = record_type {
                if record.record_type() != rt {
                    continue;
                }
            }
            if latest
                .as_ref()
                .map_or(true, |l| record.created_at > l.created_at)
            {
                latest = Some(record);
            }
        }
        Ok(latest)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn counter(&self, record_type: RecordType) -> SequenceCounter {
        SequenceCounter::new(
            Arc::clone(&self.storage),
            StorePaths::evidence_seq(record_type.file_prefix()),
        )
    }

    fn memoized(&self, utid: Utid) -> Option<String> {
        self.filenames.lock().ok()?.get(&utid).cloned()
    }

    fn memoize(&self, utid: Utid, path: &str) {
        if let Ok(mut filenames) = self.filenames.lock() {
            filenames.insert(utid, path.to_string());
        }
    }

    /// Finds the file holding a UTID's record: memo first, then a store
    /// scan (covers records written by an earlier ledger instance).
    async fn locate(&self, utid: Utid) -> Result<Option<String>> {
        if let Some(path) = self.memoized(utid) {
            return Ok(Some(path));
        }

        let needle = utid.to_string();
        for meta in self.storage.list(&StorePaths::evidence_prefix()).await? {
            if !is_execution_record_path(&meta.path) {
                continue;
            }
            let Ok(bytes) = self.storage.get(&meta.path).await else {
                continue;
            };
            let Ok(value) = serde_json::from_slice::<Value>(&bytes) else {
                continue;
            };
            if value.get("utid").and_then(Value::as_str) == Some(needle.as_str()) {
                self.memoize(utid, &meta.path);
                return Ok(Some(meta.path));
            }
        }
        Ok(None)
    }

    /// Read-merge-write with CAS. Allocates the sequenced file name on the
    /// first write for a UTID.
    async fn upsert(
        &self,
        utid: Utid,
        layer: Layer,
        manifest_id: &str,
        manifest_version: &str,
        mutate: impl Fn(&mut EvidenceRecord),
    ) -> Result<()> {
        let path = match self.locate(utid).await? {
            Some(path) => path,
            None => {
                let record_type = RecordType::from_layer(layer);
                let seq = self.counter(record_type).next().await?;
                let filename =
                    sequenced_filename(record_type, seq, manifest_id, manifest_version);
                let path = StorePaths::evidence_record(&filename);
                self.memoize(utid, &path);
                path
            }
        };

        for _ in 0..MERGE_RETRIES {
            let head = self.storage.head(&path).await?;

            let (mut record, precondition) = match &head {
                None => (
                    EvidenceRecord::new(utid, layer, manifest_id, manifest_version),
                    WritePrecondition::DoesNotExist,
                ),
                Some(meta) => {
                    let bytes = self.storage.get(&path).await?;
                    (
                        decode_record(&bytes, &path)?,
                        WritePrecondition::MatchesVersion(meta.version.clone()),
                    )
                }
            };

            mutate(&mut record);
            record.updated_at = Utc::now();

            let body =
                serde_json::to_vec_pretty(&record).map_err(|e| LedgerError::Serialization {
                    message: format!("evidence record: {e}"),
                })?;

            match self
                .storage
                .put(&path, Bytes::from(body), precondition)
                .await?
            {
                WriteResult::Success { .. } => return Ok(()),
                WriteResult::PreconditionFailed { .. } => {
                    // Lost the race; re-read and re-apply the merge.
                }
            }
        }

        Err(LedgerError::Core(CoreError::PreconditionFailed {
            message: format!("evidence record {path} contended past retry budget"),
        }))
    }
}

fn sequenced_filename(
    record_type: RecordType,
    seq: u64,
    manifest_id: &str,
    manifest_version: &str,
) -> String {
    let safe_id = manifest_id.replace('/', "_");
    format!(
        "{}_{seq:04}_{safe_id}_v{manifest_version}.json",
        record_type.file_prefix()
    )
}

fn is_execution_record_path(path: &str) -> bool {
    let Some(name) = path.strip_prefix("evidence_store/") else {
        return false;
    };
    name.ends_with(".json") && !name.starts_with("deploy_") && !name.starts_with(".seq")
}

fn decode_record(bytes: &Bytes, path: &str) -> Result<EvidenceRecord> {
    serde_json::from_slice(bytes).map_err(|e| LedgerError::CorruptRecord {
        path: path.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::storage::MemoryBackend;

    fn ledger() -> EvidenceLedger {
        EvidenceLedger::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn intent_creates_a_sequenced_queued_record() {
        let ledger = ledger();
        let utid = Utid::generate();

        ledger
            .write_intent(utid, Layer::Curation, "bls_employment_stats", "1.0.0", "abcd")
            .await
            .expect("intent");

        let record = ledger.read(utid).await.expect("read").expect("exists");
        assert_eq!(record.status, ExecutionStatus::Queued);
        assert_eq!(record.content_hash.as_deref(), Some("abcd"));
        assert!(record.queued_at.is_some());

        let files = ledger
            .storage
            .list("evidence_store/")
            .await
            .expect("list")
            .into_iter()
            .filter(|m| m.path.contains("curation_"))
            .count();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn updates_merge_into_the_same_file_and_keep_created_at() {
        let ledger = ledger();
        let utid = Utid::generate();

        ledger
            .write_intent(utid, Layer::Curation, "x", "1.0.0", "h")
            .await
            .unwrap();
        let created = ledger.read(utid).await.unwrap().unwrap().created_at;

        ledger
            .update_status(
                utid,
                StatusUpdate::to(ExecutionStatus::Started).with_engine("local", "1.0.0"),
            )
            .await
            .unwrap();
        ledger
            .update_status(
                utid,
                StatusUpdate::to(ExecutionStatus::Success).with_doc_id("doc-x"),
            )
            .await
            .unwrap();

        let record = ledger.read(utid).await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Success);
        assert_eq!(record.created_at, created);
        assert_eq!(record.doc_id.as_deref(), Some("doc-x"));
        assert!(record.started_at.is_some());
        assert!(record.success_at.is_some());

        // Still exactly one execution record file.
        let files = ledger
            .storage
            .list("evidence_store/")
            .await
            .unwrap()
            .into_iter()
            .filter(|m| is_execution_record_path(&m.path))
            .count();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn sequence_numbers_order_files_per_type() {
        let ledger = ledger();
        for i in 0..3 {
            let utid = Utid::generate();
            ledger
                .write_intent(utid, Layer::Curation, &format!("m{i}"), "1.0.0", "h")
                .await
                .unwrap();
        }

        let mut names: Vec<String> = ledger
            .storage
            .list("evidence_store/")
            .await
            .unwrap()
            .into_iter()
            .filter(|m| is_execution_record_path(&m.path))
            .map(|m| m.path)
            .collect();
        names.sort();
        assert!(names[0].contains("curation_0001_m0"));
        assert!(names[1].contains("curation_0002_m1"));
        assert!(names[2].contains("curation_0003_m2"));
    }

    #[tokio::test]
    async fn locate_scans_when_memo_is_cold() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let writer = EvidenceLedger::new(Arc::clone(&backend));
        let utid = Utid::generate();
        writer
            .write_intent(utid, Layer::Curation, "x", "1.0.0", "h")
            .await
            .unwrap();

        // A fresh ledger instance has no memo; it must find the same file.
        let reader = EvidenceLedger::new(backend);
        let record = reader.read(utid).await.unwrap().unwrap();
        assert_eq!(record.manifest_id, "x");
    }

    #[tokio::test]
    async fn find_first_success_excludes_replays_and_picks_earliest() {
        let ledger = ledger();

        let original = Utid::generate();
        ledger
            .write_intent(original, Layer::Curation, "m", "1.0.0", "h")
            .await
            .unwrap();
        ledger
            .update_status(original, StatusUpdate::to(ExecutionStatus::Success))
            .await
            .unwrap();

        let replay = Utid::generate();
        ledger
            .write_replay_intent(replay, Layer::Curation, "m", "1.0.0", "h", original)
            .await
            .unwrap();
        ledger
            .update_status(replay, StatusUpdate::to(ExecutionStatus::Success))
            .await
            .unwrap();

        let later = Utid::generate();
        ledger
            .write_intent(later, Layer::Curation, "m", "1.0.0", "h")
            .await
            .unwrap();
        ledger
            .update_status(later, StatusUpdate::to(ExecutionStatus::Success))
            .await
            .unwrap();

        let first = ledger
            .find_first_success("m", "1.0.0")
            .await
            .unwrap()
            .expect("found");
        assert_eq!(first.utid, original);
    }

    #[tokio::test]
    async fn semantic_records_carry_lineage_links() {
        let ledger = ledger();
        let utid = Utid::generate();
        let curation = Utid::generate();

        ledger
            .write_semantic(SemanticEvidence {
                utid,
                doc_id: Some("doc-1".into()),
                manifest_id: "ontology".into(),
                manifest_version: "1.0.0".into(),
                curation_utid: Some(curation),
                source_manifest_ref: Some("facts".into()),
                domain: "macroeconomics".into(),
                engine: "local".into(),
                engine_version: "1.0.0".into(),
                output_path: Some("semantic_store/macroeconomics/x.json".into()),
                record_count: 3,
                components: vec![ComponentRun {
                    step: "projection".into(),
                    path: "engines.semantic.local.v1.ontology_mapper.run".into(),
                    version: "1.0.0".into(),
                    status: Some("SUCCESS".into()),
                }],
                status: ExecutionStatus::Success,
                error: None,
            })
            .await
            .unwrap();

        let record = ledger.read(utid).await.unwrap().unwrap();
        assert_eq!(record.layer, Layer::Semantics);
        assert_eq!(record.curation_utid, Some(curation));
        assert_eq!(record.doc_id.as_deref(), Some("doc-1"));

        // Semantic failure path records instead of raising.
        let failed = Utid::generate();
        ledger
            .write_semantic(SemanticEvidence {
                utid: failed,
                doc_id: None,
                manifest_id: "ontology".into(),
                manifest_version: "1.0.0".into(),
                curation_utid: None,
                source_manifest_ref: None,
                domain: "macroeconomics".into(),
                engine: "local".into(),
                engine_version: "1.0.0".into(),
                output_path: None,
                record_count: 0,
                components: Vec::new(),
                status: ExecutionStatus::Failure,
                error: Some("no fact found".into()),
            })
            .await
            .unwrap();

        let record = ledger.read(failed).await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Failure);
        assert_eq!(record.error.as_deref(), Some("no fact found"));
    }

    #[tokio::test]
    async fn deployment_records_are_separate_and_listable() {
        let ledger = ledger();
        let id = ledger
            .write_deployment(DeploymentEvidence {
                manifest_id: "bls_employment_stats".into(),
                manifest_version: "1.0.0".into(),
                content_hash: "abcd".into(),
                layer: Layer::Curation,
                agency: "bls".into(),
                source_path: Some("registry/bls_employment_stats.json".into()),
                target_path: "manifest_store/curation/manifests/bls/bls_employment_stats/v1.0.0/manifest.json".into(),
                engine: Some("local".into()),
                engine_version: Some("1.0.0".into()),
                status: "SUCCESS".into(),
                forced: false,
            })
            .await
            .unwrap();
        assert!(id.starts_with("deploy-"));

        let deployments = ledger.list_deployments(None).await.unwrap();
        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments[0].manifest_id, "bls_employment_stats");

        // Deployment files never show up as execution records.
        assert!(ledger.list_all().await.unwrap().is_empty());
        assert!(
            ledger
                .list_deployments(Some("other"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn find_latest_filters_by_type() {
        let ledger = ledger();
        let c = Utid::generate();
        ledger
            .write_intent(c, Layer::Curation, "m", "1.0.0", "h")
            .await
            .unwrap();

        let s = Utid::generate();
        ledger
            .write_intent(s, Layer::Semantics, "ontology", "1.0.0", "h")
            .await
            .unwrap();

        let latest_semantic = ledger
            .find_latest(Some(RecordType::Semantic))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest_semantic.utid, s);

        let latest_any = ledger.find_latest(None).await.unwrap().unwrap();
        assert_eq!(latest_any.utid, s);
    }
}
