//! Shared fixtures for the Strata end-to-end tests.
//!
//! `TestPlatform` wires a full control plane over an isolated in-memory
//! backend and seeds the storage plane the way the onboarding tooling
//! would: wild source files, reference data, and data models placed next
//! to the deployed manifests.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;

use strata_core::storage::{MemoryBackend, StorageBackend, WritePrecondition};
use strata_core::{Layer, StorePaths};
use strata_ledger::EvidenceLedger;
use strata_manifest::{Manifest, ManifestStore};
use strata_runtime::engines::builtin_registry;
use strata_runtime::resolver::LOCAL_ENGINE_BASE;
use strata_runtime::{EngineRegistry, Orchestrator};

/// A complete control plane over an isolated in-memory store.
pub struct TestPlatform {
    /// The backing store shared by every subsystem.
    pub storage: Arc<dyn StorageBackend>,
    /// The manifest store.
    pub store: Arc<ManifestStore>,
    /// The evidence ledger.
    pub ledger: Arc<EvidenceLedger>,
    /// The orchestrator fronting it all.
    pub orchestrator: Orchestrator,
}

impl TestPlatform {
    /// Builds a platform with the built-in `local` engine.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(|_| {})
    }

    /// Builds a platform, letting the caller add engine aliases or extra
    /// components before the registry is sealed.
    #[must_use]
    pub fn with_registry(customize: impl FnOnce(&mut EngineRegistry)) -> Self {
        Self::assemble(Arc::new(MemoryBackend::new()), customize)
    }

    /// Builds a platform over an explicit backend (e.g. a local filesystem
    /// root).
    #[must_use]
    pub fn over_storage(storage: Arc<dyn StorageBackend>) -> Self {
        Self::assemble(storage, |_| {})
    }

    fn assemble(
        storage: Arc<dyn StorageBackend>,
        customize: impl FnOnce(&mut EngineRegistry),
    ) -> Self {
        let mut registry = builtin_registry(&storage);
        customize(&mut registry);
        let registry = Arc::new(registry);

        let store = Arc::new(ManifestStore::new(Arc::clone(&storage)));
        let ledger = Arc::new(EvidenceLedger::new(Arc::clone(&storage)));
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            registry,
            Arc::clone(&storage),
        );

        Self {
            storage,
            store,
            ledger,
            orchestrator,
        }
    }

    /// Builds a platform where `alias` is registered as an additional
    /// engine name for the built-in component namespace.
    #[must_use]
    pub fn with_engine_alias(alias: &str) -> Self {
        let alias = alias.to_string();
        Self::with_registry(move |registry| {
            registry.register_engine(&alias, LOCAL_ENGINE_BASE);
        })
    }

    /// Drops a file into the wild zone.
    pub async fn seed_wild(&self, relative: &str, content: &str) {
        self.put(&StorePaths::wild_file(relative), content.as_bytes())
            .await;
    }

    /// Places a JSON document at an arbitrary store path.
    pub async fn seed_json(&self, path: &str, value: &Value) {
        let body = serde_json::to_vec_pretty(value).expect("serialize seed");
        self.put(path, &body).await;
    }

    async fn put(&self, path: &str, body: &[u8]) {
        self.storage
            .put(path, Bytes::copy_from_slice(body), WritePrecondition::None)
            .await
            .expect("seed write");
    }

    /// Seeds the standard employment fixture: wild CSV, reference data,
    /// and data model for [`employment_manifest`].
    pub async fn seed_employment_fixture(&self) {
        self.seed_wild(
            "bls/employment_stats.csv",
            "state,observation_year,rate\n\
             California,2023,4.8\n\
             Texas,2023,4.1\n",
        )
        .await;
        self.seed_json(
            &StorePaths::reference_data(Layer::Curation, "bls", "state_mappings", "1.0.0"),
            &serde_json::json!({
                "mappings": { "California": "CA", "Texas": "TX" }
            }),
        )
        .await;
        self.seed_json(
            &StorePaths::data_model(Layer::Curation, "bls", "employment_model"),
            &serde_json::json!({
                "schema_version": "1.0.0",
                "semantic_definition": "State unemployment observations",
                "column_count": 2,
                "columns": [
                    {
                        "column_name": "unemployment_rate",
                        "data_type": "float",
                        "quality_checks": [
                            { "check": "not_null" },
                            { "check": "positive" },
                            { "check": "range", "params": { "min": 0, "max": 100 } }
                        ]
                    },
                    {
                        "column_name": "state_code",
                        "data_type": "string",
                        "quality_checks": [ { "check": "not_null" } ]
                    }
                ]
            }),
        )
        .await;
    }
}

impl Default for TestPlatform {
    fn default() -> Self {
        Self::new()
    }
}

/// The standard curation manifest: ingest, parse, map, enrich, validate,
/// write facts.
#[must_use]
pub fn employment_manifest(version: &str, engine: &str) -> Manifest {
    serde_json::from_value(serde_json::json!({
        "identity": {
            "name": "bls_employment_stats",
            "domain": "labor",
            "agency": "bls",
            "owner": "data-eng"
        },
        "evolution": {
            "manifest_version": version,
            "manifest_schema_version": "1.0.0",
            "data_schema_version": "1.0.0",
            "engine": engine,
            "engine_version": "1.0.0"
        },
        "reference_data": {
            "state_mappings": { "path": "state_mappings", "version": "1.0.0" }
        },
        "data_model": { "path": "employment_model", "version": "1.0.0" },
        "intent": {
            "ingestion": {
                "component": { "path": "v1.ingest_default.run", "version": "1.0.0" },
                "params": { "source_url": "wild/bls/employment_stats.csv" }
            },
            "processing": [
                {
                    "step": "parse",
                    "component": { "path": "v1.csv_parser.run", "version": "1.0.0" }
                },
                {
                    "step": "map_fields",
                    "component": { "path": "v1.field_mapper.run", "version": "1.0.0" },
                    "params": { "mappings": { "rate": "unemployment_rate" } }
                },
                {
                    "step": "enrich_state",
                    "component": { "path": "v1.reference_enricher.run", "version": "1.0.0" },
                    "params": {
                        "source_field": "state",
                        "target_field": "state_code",
                        "mapping_ref": "state_mappings"
                    }
                },
                {
                    "step": "validate",
                    "component": { "path": "v1.validate_quality.run", "version": "1.0.0" }
                },
                {
                    "step": "write_facts",
                    "component": { "path": "v1.fact_writer.run", "version": "1.0.0" }
                }
            ]
        },
        "governance": { "retention_days": 730, "classification": "public" }
    }))
    .expect("employment manifest")
}

/// A minimal curation manifest for a second agency (census population).
#[must_use]
pub fn population_manifest(version: &str) -> Manifest {
    serde_json::from_value(serde_json::json!({
        "identity": {
            "name": "census_population",
            "domain": "demographics",
            "agency": "census",
            "owner": "data-eng"
        },
        "evolution": {
            "manifest_version": version,
            "manifest_schema_version": "1.0.0",
            "engine": "local",
            "engine_version": "1.0.0"
        },
        "intent": {
            "ingestion": {
                "component": { "path": "v1.ingest_default.run", "version": "1.0.0" },
                "params": { "source_url": "wild/census/population.csv" }
            },
            "processing": [
                {
                    "step": "parse",
                    "component": { "path": "v1.csv_parser.run", "version": "1.0.0" }
                },
                {
                    "step": "write_facts",
                    "component": { "path": "v1.fact_writer.run", "version": "1.0.0" }
                }
            ]
        }
    }))
    .expect("population manifest")
}

/// A semantic projection manifest over a curation source.
#[must_use]
pub fn ontology_manifest(
    name: &str,
    domain: &str,
    source_ref: &str,
    mapping: &[(&str, &str)],
) -> Manifest {
    let mapping: Vec<Value> = mapping
        .iter()
        .map(|(source_key, target_concept)| {
            serde_json::json!({ "source_key": source_key, "target_concept": target_concept })
        })
        .collect();

    serde_json::from_value(serde_json::json!({
        "identity": {
            "name": name,
            "domain": domain,
            "agency": "bls",
            "owner": "semantics"
        },
        "evolution": {
            "manifest_version": "1.0.0",
            "manifest_schema_version": "1.0.0",
            "engine": "local",
            "engine_version": "1.0.0"
        },
        "intent": {
            "source": { "manifest_ref": source_ref },
            "projection": {
                "component": {
                    "path": "engines.semantic.local.v1.ontology_mapper.run",
                    "version": "1.0.0"
                },
                "mapping": mapping,
                "context": { "unit_system": "si", "frequency": "annual" }
            }
        }
    }))
    .expect("ontology manifest")
}

/// A retrieval fan-in manifest joining semantic projections.
#[must_use]
pub fn outlook_manifest(primary_ref: &str, secondary_ref: Option<&str>) -> Manifest {
    let mut sources = serde_json::json!({
        "primary": { "manifest_ref": primary_ref }
    });
    if let Some(secondary) = secondary_ref {
        sources["secondary"] = serde_json::json!({ "manifest_ref": secondary });
    }

    serde_json::from_value(serde_json::json!({
        "identity": {
            "name": "economic_outlook",
            "domain": "reports",
            "agency": "platform",
            "owner": "retrieval"
        },
        "evolution": {
            "manifest_version": "1.0.0",
            "manifest_schema_version": "1.0.0",
            "engine": "local",
            "engine_version": "1.0.0"
        },
        "intent": {
            "sources": sources,
            "synthesis": {
                "component": {
                    "path": "engines.retrieval.local.v1.temporal_joiner.run",
                    "version": "1.0.0"
                },
                "params": { "join_key": "observation_year", "join_type": "inner" }
            }
        }
    }))
    .expect("outlook manifest")
}
