//! Built-in in-process engine.
//!
//! One engine back-end ships with the platform: `local`, a set of
//! in-process components implementing the component contract for the three
//! layers. Alternative back-ends plug in through the same
//! [`EngineRegistry`]; the core never knows how an engine computes its
//! results.
//!
//! Component namespaces:
//!
//! ```text
//! engines.curation.local.v1.{ingest_default, csv_parser, field_mapper,
//!                             reference_enricher, validate_quality,
//!                             fact_writer}.run
//! engines.semantic.local.v1.ontology_mapper.run
//! engines.retrieval.local.v1.temporal_joiner.run
//! ```

pub mod curation;
pub mod retrieval;
pub mod semantic;

use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;

use strata_core::storage::{StorageBackend, WritePrecondition, WriteResult};
use strata_core::{Error as CoreError, Utid};

use crate::envelope::ArtifactEnvelope;
use crate::error::{Result, RuntimeError};
use crate::resolver::{EngineRegistry, LOCAL_ENGINE_BASE};

/// Builds a registry with the `local` engine and every built-in component.
#[must_use]
pub fn builtin_registry(storage: &Arc<dyn StorageBackend>) -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    registry.register_engine("local", LOCAL_ENGINE_BASE);
    curation::register(&mut registry, storage);
    semantic::register(&mut registry, storage);
    retrieval::register(&mut registry, storage);
    registry
}

/// Reads and decodes an artifact envelope.
pub(crate) async fn read_envelope(
    storage: &Arc<dyn StorageBackend>,
    path: &str,
) -> Result<ArtifactEnvelope> {
    let bytes = storage.get(path).await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        RuntimeError::component(format!("corrupt artifact envelope {path}: {e}"))
    })
}

/// Writes an artifact envelope immutably (`DoesNotExist`).
pub(crate) async fn write_envelope(
    storage: &Arc<dyn StorageBackend>,
    path: &str,
    envelope: &ArtifactEnvelope,
) -> Result<()> {
    let body = serde_json::to_vec_pretty(envelope)
        .map_err(|e| CoreError::serialization(format!("artifact envelope: {e}")))?;
    match storage
        .put(path, Bytes::from(body), WritePrecondition::DoesNotExist)
        .await?
    {
        WriteResult::Success { .. } => Ok(()),
        WriteResult::PreconditionFailed { .. } => Err(RuntimeError::component(format!(
            "artifact already exists, refusing to overwrite: {path}"
        ))),
    }
}

/// Finds the artifact under `prefix` whose file name embeds the given UTID.
pub(crate) async fn find_artifact_by_utid(
    storage: &Arc<dyn StorageBackend>,
    prefix: &str,
    utid: Utid,
) -> Result<Option<String>> {
    let needle = utid.as_ulid().to_string();
    for meta in storage.list(prefix).await? {
        let name = meta.path.rsplit('/').next().unwrap_or(&meta.path);
        if name.ends_with(".json") && name.contains(&needle) {
            return Ok(Some(meta.path));
        }
    }
    Ok(None)
}

/// Finds the most recent envelope under `prefix` produced by a manifest.
///
/// "Most recent" is by file name, descending: artifact names embed a
/// monotonic sequence, so lexicographic order is creation order.
pub(crate) async fn find_latest_envelope_for_manifest(
    storage: &Arc<dyn StorageBackend>,
    prefix: &str,
    manifest_ref: &str,
) -> Result<Option<(String, ArtifactEnvelope)>> {
    let mut paths: Vec<String> = storage
        .list(prefix)
        .await?
        .into_iter()
        .map(|m| m.path)
        .filter(|p| p.ends_with(".json") && !p.contains("/.seq"))
        .collect();
    paths.sort();
    paths.reverse();

    for path in paths {
        let Ok(bytes) = storage.get(&path).await else {
            continue;
        };
        let Ok(envelope) = serde_json::from_slice::<ArtifactEnvelope>(&bytes) else {
            continue;
        };
        if envelope.metadata.manifest_id.contains(manifest_ref) {
            return Ok(Some((path, envelope)));
        }
    }
    Ok(None)
}

/// Decodes typed parameters out of a step's raw parameter map.
pub(crate) fn decode_params<T: serde::de::DeserializeOwned>(
    params: &serde_json::Map<String, Value>,
) -> Result<T> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| RuntimeError::component(format!("invalid component params: {e}")))
}
