//! The manifest store: single source of truth for deployed manifests.
//!
//! Every deployed version of every manifest is held immutably, keyed by
//! (layer, agency, manifest id, version). Deployment is idempotent and
//! governance-enforcing:
//!
//! - identical content under a deployed version is a no-op (`Skipped`)
//! - different content under a deployed version is a
//!   [`ManifestError::GovernanceViolation`] unless explicitly forced
//! - the latest pointer only moves to a semantically higher version, so an
//!   out-of-order backfill deploy never disturbs "latest"
//!
//! Version records are written with a `DoesNotExist` precondition and the
//! latest pointer with a `MatchesVersion` precondition, so concurrent
//! deploys of the same identity cannot silently overwrite each other.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use strata_core::canonical;
use strata_core::storage::{StorageBackend, WritePrecondition, WriteResult};
use strata_core::version;
use strata_core::{Error as CoreError, Layer, StorePaths};

use crate::error::{ManifestError, Result};
use crate::model::Manifest;

/// Retry budget for the latest-pointer CAS loop.
const POINTER_RETRIES: usize = 16;

/// The deployed, persisted form of a manifest version.
///
/// Created on deploy; never mutated; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestVersionRecord {
    /// The manifest identity.
    pub manifest_id: String,
    /// The deployed content version.
    pub version: String,
    /// The manifest content itself.
    pub manifest: Manifest,
    /// Content hash over the canonicalized manifest.
    pub content_hash: String,
    /// When this version was deployed.
    pub deployed_at: DateTime<Utc>,
    /// The version that was latest when this one was deployed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    /// Layer this manifest was deployed under.
    pub layer: Layer,
    /// Agency this manifest was deployed under.
    pub agency: String,
}

/// The one mutable artifact per manifest identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestPointer {
    /// Version currently considered canonical.
    pub version: String,
    /// When the pointer last moved.
    pub updated_at: DateTime<Utc>,
}

/// Outcome status of a deploy call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployStatus {
    /// A new immutable version record was written.
    Deployed,
    /// This exact content was already deployed under this version.
    Skipped,
}

/// Result of a deploy call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployOutcome {
    /// What happened.
    pub status: DeployStatus,
    /// The manifest identity.
    pub manifest_id: String,
    /// The deployed version.
    pub version: String,
    /// Content hash of the deployed manifest.
    pub content_hash: String,
    /// The latest version before this deploy, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    /// Whether this deploy moved the latest pointer.
    pub is_latest: bool,
    /// Engine declared by the manifest.
    pub engine: String,
    /// Engine version declared by the manifest.
    pub engine_version: String,
    /// True when a governance conflict was overridden with `force`.
    pub forced: bool,
}

/// Summary entry for `list_deployed`.
#[derive(Debug, Clone, Serialize)]
pub struct DeployedSummary {
    /// The manifest identity.
    pub manifest_id: String,
    /// The latest deployed version.
    pub version: String,
    /// When the latest version was deployed.
    pub deployed_at: DateTime<Utc>,
    /// Content hash of the latest version.
    pub content_hash: String,
    /// All deployed versions, ascending.
    pub all_versions: Vec<String>,
}

/// Summary entry for `list_versions`.
#[derive(Debug, Clone, Serialize)]
pub struct VersionSummary {
    /// The version.
    pub version: String,
    /// When it was deployed.
    pub deployed_at: DateTime<Utc>,
    /// Its content hash.
    pub content_hash: String,
    /// The version that was latest when it was deployed.
    pub previous_version: Option<String>,
}

/// The manifest store.
pub struct ManifestStore {
    storage: Arc<dyn StorageBackend>,
}

impl ManifestStore {
    /// Creates a store over the given backend.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Deploys a manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::GovernanceViolation`] when the version is
    /// already deployed with different content and `force` is false, or a
    /// storage error.
    pub async fn deploy(
        &self,
        manifest: &Manifest,
        layer: Layer,
        agency: &str,
        force: bool,
    ) -> Result<DeployOutcome> {
        let manifest_id = manifest.manifest_id().to_string();
        if manifest_id.trim().is_empty() {
            return Err(ManifestError::MissingField {
                field: "identity.name".to_string(),
            });
        }
        let new_version = manifest.version().to_string();
        let new_hash = canonical::content_hash(manifest)?;

        let record_path =
            StorePaths::manifest_version_record(layer, agency, &manifest_id, &new_version);

        let mut forced = false;
        if let Some(existing) = self.read_record(&record_path).await? {
            if existing.content_hash == new_hash {
                tracing::info!(
                    manifest_id = %manifest_id,
                    version = %new_version,
                    "identical content already deployed, skipping"
                );
                return Ok(skipped_outcome(manifest, &manifest_id, &new_version, &new_hash));
            }
            if !force {
                return Err(ManifestError::GovernanceViolation {
                    manifest_id,
                    version: new_version,
                    existing_hash: existing.content_hash,
                    new_hash,
                });
            }
            tracing::warn!(
                manifest_id = %manifest_id,
                version = %new_version,
                existing_hash = %existing.content_hash,
                new_hash = %new_hash,
                "FORCED deploy overriding governance: same version, different content"
            );
            forced = true;
        }

        let previous_version = self.read_pointer(layer, agency, &manifest_id).await?.map(|p| p.version);

        let record = ManifestVersionRecord {
            manifest_id: manifest_id.clone(),
            version: new_version.clone(),
            manifest: manifest.clone(),
            content_hash: new_hash.clone(),
            deployed_at: Utc::now(),
            previous_version: previous_version.clone(),
            layer,
            agency: agency.to_string(),
        };

        let body = serde_json::to_vec_pretty(&record)
            .map_err(|e| CoreError::serialization(format!("manifest record: {e}")))?;
        let precondition = if forced {
            // Administrative override rewrites the record in place.
            WritePrecondition::None
        } else {
            WritePrecondition::DoesNotExist
        };

        match self
            .storage
            .put(&record_path, Bytes::from(body), precondition)
            .await?
        {
            WriteResult::Success { .. } => {}
            WriteResult::PreconditionFailed { .. } => {
                // A concurrent deploy won the race; re-evaluate against what
                // actually landed.
                let landed = self.read_record(&record_path).await?.ok_or_else(|| {
                    CoreError::internal("version record vanished after CAS failure")
                })?;
                if landed.content_hash == new_hash {
                    return Ok(skipped_outcome(manifest, &manifest_id, &new_version, &new_hash));
                }
                return Err(ManifestError::GovernanceViolation {
                    manifest_id,
                    version: new_version,
                    existing_hash: landed.content_hash,
                    new_hash,
                });
            }
        }

        let is_latest = self
            .advance_pointer(layer, agency, &manifest_id, &new_version)
            .await?;

        tracing::info!(
            manifest_id = %manifest_id,
            version = %new_version,
            content_hash = %new_hash,
            is_latest,
            "manifest deployed"
        );

        Ok(DeployOutcome {
            status: DeployStatus::Deployed,
            manifest_id,
            version: new_version,
            content_hash: new_hash,
            previous_version,
            is_latest,
            engine: manifest.evolution.engine.clone(),
            engine_version: manifest.evolution.engine_version.clone(),
            forced,
        })
    }

    /// Returns a deployed version record, or the latest when `version` is
    /// omitted. Absence is `None`, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only for storage or decode failures.
    pub async fn get_deployed(
        &self,
        manifest_id: &str,
        version: Option<&str>,
    ) -> Result<Option<ManifestVersionRecord>> {
        let Some((layer, agency)) = self.find_location(manifest_id).await? else {
            return Ok(None);
        };

        let resolved = match version {
            Some(v) => v.to_string(),
            None => {
                let Some(pointer) = self.read_pointer(layer, &agency, manifest_id).await? else {
                    return Ok(None);
                };
                pointer.version
            }
        };

        let path = StorePaths::manifest_version_record(layer, &agency, manifest_id, &resolved);
        self.read_record(&path).await
    }

    /// Returns the latest deployed version string for a manifest identity.
    ///
    /// # Errors
    ///
    /// Returns an error only for storage or decode failures.
    pub async fn get_deployed_version(&self, manifest_id: &str) -> Result<Option<String>> {
        let Some((layer, agency)) = self.find_location(manifest_id).await? else {
            return Ok(None);
        };
        Ok(self
            .read_pointer(layer, &agency, manifest_id)
            .await?
            .map(|p| p.version))
    }

    /// Returns all deployed versions for an identity, ascending by loose
    /// semantic-version ordering.
    ///
    /// # Errors
    ///
    /// Returns an error only for storage failures.
    pub async fn get_all_versions(&self, manifest_id: &str) -> Result<Vec<String>> {
        let Some((layer, agency)) = self.find_location(manifest_id).await? else {
            return Ok(Vec::new());
        };

        let prefix = format!("{}/", StorePaths::manifest_dir(layer, &agency, manifest_id));
        let mut versions = Vec::new();
        for meta in self.storage.list(&prefix).await? {
            let Some(rest) = meta.path.strip_prefix(&prefix) else {
                continue;
            };
            // v{version}/manifest.json
            if let Some(dir) = rest.strip_suffix("/manifest.json") {
                if let Some(v) = dir.strip_prefix('v') {
                    versions.push(v.to_string());
                }
            }
        }
        version::sort_ascending(&mut versions);
        Ok(versions)
    }

    /// Returns the record for execution, failing loudly when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::NotDeployed`] listing the available versions
    /// when the manifest (or the pinned version) is not deployed.
    pub async fn get_manifest_for_execution(
        &self,
        manifest_id: &str,
        version: Option<&str>,
    ) -> Result<ManifestVersionRecord> {
        if let Some(record) = self.get_deployed(manifest_id, version).await? {
            return Ok(record);
        }
        Err(ManifestError::NotDeployed {
            manifest_id: manifest_id.to_string(),
            requested: version.map_or_else(|| "latest".to_string(), |v| format!("v{v}")),
            available: self.get_all_versions(manifest_id).await?,
        })
    }

    /// Lists all deployed manifests with their latest-version summaries.
    ///
    /// # Errors
    ///
    /// Returns an error only for storage or decode failures.
    pub async fn list_deployed(&self) -> Result<Vec<DeployedSummary>> {
        let mut summaries = Vec::new();

        for layer in Layer::all() {
            let prefix = StorePaths::layer_manifests_prefix(*layer);
            let mut ids = std::collections::BTreeSet::new();
            for meta in self.storage.list(&prefix).await? {
                if let Some(rest) = meta.path.strip_prefix(&prefix) {
                    let mut segments = rest.split('/');
                    if let (Some(_agency), Some(id)) = (segments.next(), segments.next()) {
                        ids.insert(id.to_string());
                    }
                }
            }

            for id in ids {
                let Some(latest) = self.get_deployed(&id, None).await? else {
                    continue;
                };
                summaries.push(DeployedSummary {
                    manifest_id: id.clone(),
                    version: latest.version,
                    deployed_at: latest.deployed_at,
                    content_hash: latest.content_hash,
                    all_versions: self.get_all_versions(&id).await?,
                });
            }
        }

        Ok(summaries)
    }

    /// Lists every deployed version of one manifest with metadata.
    ///
    /// # Errors
    ///
    /// Returns an error only for storage or decode failures.
    pub async fn list_versions(&self, manifest_id: &str) -> Result<Vec<VersionSummary>> {
        let mut records = Vec::new();
        for v in self.get_all_versions(manifest_id).await? {
            if let Some(record) = self.get_deployed(manifest_id, Some(&v)).await? {
                records.push(VersionSummary {
                    version: record.version,
                    deployed_at: record.deployed_at,
                    content_hash: record.content_hash,
                    previous_version: record.previous_version,
                });
            }
        }
        Ok(records)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn read_record(&self, path: &str) -> Result<Option<ManifestVersionRecord>> {
        match self.storage.get(path).await {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .map_err(|e| CoreError::serialization(format!("corrupt record {path}: {e}")))?;
                Ok(Some(record))
            }
            Err(CoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_pointer(
        &self,
        layer: Layer,
        agency: &str,
        manifest_id: &str,
    ) -> Result<Option<LatestPointer>> {
        let path = StorePaths::latest_pointer(layer, agency, manifest_id);
        match self.storage.get(&path).await {
            Ok(bytes) => {
                let pointer = serde_json::from_slice(&bytes)
                    .map_err(|e| CoreError::serialization(format!("corrupt pointer {path}: {e}")))?;
                Ok(Some(pointer))
            }
            Err(CoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Moves the latest pointer iff `candidate` outranks the current value.
    /// Returns whether the pointer ended up at `candidate`.
    async fn advance_pointer(
        &self,
        layer: Layer,
        agency: &str,
        manifest_id: &str,
        candidate: &str,
    ) -> Result<bool> {
        let path = StorePaths::latest_pointer(layer, agency, manifest_id);

        for _ in 0..POINTER_RETRIES {
            let head = self.storage.head(&path).await?;
            let precondition = match &head {
                None => WritePrecondition::DoesNotExist,
                Some(meta) => {
                    let current = self.read_pointer(layer, agency, manifest_id).await?;
                    if let Some(pointer) = current {
                        if !version::outranks(candidate, &pointer.version) {
                            return Ok(version::compare(candidate, &pointer.version)
                                == std::cmp::Ordering::Equal);
                        }
                    }
                    WritePrecondition::MatchesVersion(meta.version.clone())
                }
            };

            let pointer = LatestPointer {
                version: candidate.to_string(),
                updated_at: Utc::now(),
            };
            let body = serde_json::to_vec_pretty(&pointer)
                .map_err(|e| CoreError::serialization(format!("latest pointer: {e}")))?;

            match self.storage.put(&path, Bytes::from(body), precondition).await? {
                WriteResult::Success { .. } => return Ok(true),
                WriteResult::PreconditionFailed { .. } => {
                    // Concurrent pointer move; re-read and re-compare.
                }
            }
        }

        Err(ManifestError::Core(CoreError::PreconditionFailed {
            message: format!("latest pointer for '{manifest_id}' contended past retry budget"),
        }))
    }

    /// Finds the (layer, agency) an identity is deployed under.
    ///
    /// Identity is unique within a (layer, agency) scope; callers that look
    /// up by bare id get the first scope that contains it.
    async fn find_location(&self, manifest_id: &str) -> Result<Option<(Layer, String)>> {
        for layer in Layer::all() {
            let prefix = StorePaths::layer_manifests_prefix(*layer);
            for meta in self.storage.list(&prefix).await? {
                let Some(rest) = meta.path.strip_prefix(&prefix) else {
                    continue;
                };
                let mut segments = rest.split('/');
                if let (Some(agency), Some(id)) = (segments.next(), segments.next()) {
                    if id == manifest_id {
                        return Ok(Some((*layer, agency.to_string())));
                    }
                }
            }
        }
        Ok(None)
    }
}

fn skipped_outcome(
    manifest: &Manifest,
    manifest_id: &str,
    version: &str,
    hash: &str,
) -> DeployOutcome {
    DeployOutcome {
        status: DeployStatus::Skipped,
        manifest_id: manifest_id.to_string(),
        version: version.to_string(),
        content_hash: hash.to_string(),
        previous_version: None,
        is_latest: false,
        engine: manifest.evolution.engine.clone(),
        engine_version: manifest.evolution.engine_version.clone(),
        forced: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::storage::MemoryBackend;

    fn sample_manifest(version: &str) -> Manifest {
        serde_json::from_value(serde_json::json!({
            "identity": { "name": "bls_employment_stats", "agency": "bls", "owner": "data-eng" },
            "evolution": {
                "manifest_version": version,
                "manifest_schema_version": "1.0.0",
                "engine": "local",
                "engine_version": "1.0.0"
            },
            "intent": {
                "ingestion": {
                    "component": { "path": "v1.ingest_default.run", "version": "1.0.0" },
                    "params": { "source_url": "wild/bls/employment_stats.csv" }
                }
            }
        }))
        .expect("manifest")
    }

    fn store() -> ManifestStore {
        ManifestStore::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn deploy_then_get_roundtrip() {
        let store = store();
        let outcome = store
            .deploy(&sample_manifest("1.0.0"), Layer::Curation, "bls", false)
            .await
            .expect("deploy");

        assert_eq!(outcome.status, DeployStatus::Deployed);
        assert!(outcome.is_latest);
        assert!(!outcome.forced);

        let record = store
            .get_deployed("bls_employment_stats", None)
            .await
            .expect("get")
            .expect("deployed");
        assert_eq!(record.version, "1.0.0");
        assert_eq!(record.content_hash, outcome.content_hash);
        assert_eq!(record.agency, "bls");
    }

    #[tokio::test]
    async fn identical_redeploy_is_skipped() {
        let store = store();
        let manifest = sample_manifest("1.0.0");
        store
            .deploy(&manifest, Layer::Curation, "bls", false)
            .await
            .expect("deploy");

        let outcome = store
            .deploy(&manifest, Layer::Curation, "bls", false)
            .await
            .expect("redeploy");
        assert_eq!(outcome.status, DeployStatus::Skipped);
    }

    #[tokio::test]
    async fn changed_content_same_version_is_a_governance_violation() {
        let store = store();
        store
            .deploy(&sample_manifest("1.0.0"), Layer::Curation, "bls", false)
            .await
            .expect("deploy");

        let mut changed = sample_manifest("1.0.0");
        changed.identity.owner = "someone-else".to_string();

        let err = store
            .deploy(&changed, Layer::Curation, "bls", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::GovernanceViolation { .. }));

        // The deployed record is untouched.
        let record = store
            .get_deployed("bls_employment_stats", Some("1.0.0"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.manifest.identity.owner, "data-eng");
    }

    #[tokio::test]
    async fn forced_deploy_overrides_and_flags() {
        let store = store();
        store
            .deploy(&sample_manifest("1.0.0"), Layer::Curation, "bls", false)
            .await
            .expect("deploy");

        let mut changed = sample_manifest("1.0.0");
        changed.identity.owner = "override-squad".to_string();

        let outcome = store
            .deploy(&changed, Layer::Curation, "bls", true)
            .await
            .expect("forced deploy");
        assert_eq!(outcome.status, DeployStatus::Deployed);
        assert!(outcome.forced);

        let record = store
            .get_deployed("bls_employment_stats", Some("1.0.0"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.manifest.identity.owner, "override-squad");
    }

    #[tokio::test]
    async fn latest_pointer_is_monotonic_under_out_of_order_deploys() {
        let store = store();
        for v in ["1.2.0", "2.0.0", "1.10.0"] {
            store
                .deploy(&sample_manifest(v), Layer::Curation, "bls", false)
                .await
                .expect("deploy");
        }

        // Backfilling 1.10.0 after 2.0.0 must not move the pointer.
        let latest = store
            .get_deployed_version("bls_employment_stats")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest, "2.0.0");

        let versions = store.get_all_versions("bls_employment_stats").await.unwrap();
        assert_eq!(versions, vec!["1.2.0", "1.10.0", "2.0.0"]);
    }

    #[tokio::test]
    async fn pinned_version_remains_readable_after_newer_deploys() {
        let store = store();
        store
            .deploy(&sample_manifest("1.0.0"), Layer::Curation, "bls", false)
            .await
            .unwrap();
        store
            .deploy(&sample_manifest("2.0.0"), Layer::Curation, "bls", false)
            .await
            .unwrap();

        let latest = store.get_deployed("bls_employment_stats", None).await.unwrap().unwrap();
        assert_eq!(latest.version, "2.0.0");

        let pinned = store
            .get_deployed("bls_employment_stats", Some("1.0.0"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pinned.version, "1.0.0");
    }

    #[tokio::test]
    async fn missing_manifest_is_none_not_error() {
        let store = store();
        assert!(store.get_deployed("ghost", None).await.unwrap().is_none());
        assert!(store.get_all_versions("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn execution_lookup_fails_with_available_versions() {
        let store = store();
        store
            .deploy(&sample_manifest("1.0.0"), Layer::Curation, "bls", false)
            .await
            .unwrap();

        let err = store
            .get_manifest_for_execution("bls_employment_stats", Some("9.9.9"))
            .await
            .unwrap_err();
        match err {
            ManifestError::NotDeployed {
                manifest_id,
                requested,
                available,
            } => {
                assert_eq!(manifest_id, "bls_employment_stats");
                assert_eq!(requested, "v9.9.9");
                assert_eq!(available, vec!["1.0.0"]);
            }
            other => panic!("expected NotDeployed, got {other}"),
        }
    }

    #[tokio::test]
    async fn list_deployed_summarizes_latest() {
        let store = store();
        store
            .deploy(&sample_manifest("1.0.0"), Layer::Curation, "bls", false)
            .await
            .unwrap();
        store
            .deploy(&sample_manifest("1.1.0"), Layer::Curation, "bls", false)
            .await
            .unwrap();

        let summaries = store.list_deployed().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].version, "1.1.0");
        assert_eq!(summaries[0].all_versions, vec!["1.0.0", "1.1.0"]);

        let versions = store.list_versions("bls_employment_stats").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].previous_version.as_deref(), Some("1.0.0"));
    }
}
