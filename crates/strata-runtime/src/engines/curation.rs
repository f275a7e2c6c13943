//! Curation components of the `local` engine.
//!
//! The curation layer moves data from the wild drop zone into an immutable
//! raw envelope, normalizes and enriches it, validates it against the
//! manifest's data model, and lands the result in the fact store. All logic
//! is declarative: field names, mappings, and quality rules come from the
//! manifest and its referenced files, never from code.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use strata_core::storage::StorageBackend;
use strata_core::{DocId, SequenceCounter, StorePaths, canonical};

use crate::component::{Component, ComponentDescriptor, StepOutcome};
use crate::context::ExecutionContext;
use crate::engines::{decode_params, find_artifact_by_utid, read_envelope, write_envelope};
use crate::envelope::{ArtifactEnvelope, EnvelopeMetadata, artifact_filename};
use crate::error::{Result, RuntimeError};
use crate::resolver::EngineRegistry;

/// Registers the curation components under their `local` engine namespace.
pub(crate) fn register(registry: &mut EngineRegistry, storage: &Arc<dyn StorageBackend>) {
    registry.register_component(
        "engines.curation.local.v1.ingest_default.run",
        Arc::new(IngestDefault {
            storage: Arc::clone(storage),
        }),
    );
    registry.register_component(
        "engines.curation.local.v1.csv_parser.run",
        Arc::new(CsvParser {
            storage: Arc::clone(storage),
        }),
    );
    registry.register_component(
        "engines.curation.local.v1.field_mapper.run",
        Arc::new(FieldMapper),
    );
    registry.register_component(
        "engines.curation.local.v1.reference_enricher.run",
        Arc::new(ReferenceEnricher {
            storage: Arc::clone(storage),
        }),
    );
    registry.register_component(
        "engines.curation.local.v1.validate_quality.run",
        Arc::new(QualityValidator {
            storage: Arc::clone(storage),
        }),
    );
    registry.register_component(
        "engines.curation.local.v1.fact_writer.run",
        Arc::new(FactWriter {
            storage: Arc::clone(storage),
        }),
    );
}

// ============================================================================
// ingest_default
// ============================================================================

/// Default ingestion: wild source file → immutable raw JSON envelope.
///
/// Mints the document id that every downstream artifact inherits.
pub struct IngestDefault {
    storage: Arc<dyn StorageBackend>,
}

#[derive(Deserialize)]
struct IngestParams {
    source_url: String,
    #[serde(default)]
    delimiter: Option<String>,
}

#[async_trait]
impl Component for IngestDefault {
    fn descriptor(&self) -> ComponentDescriptor {
        ComponentDescriptor {
            version: "1.0.0",
            interface: "strata.interfaces.ingest.v1",
        }
    }

    async fn invoke(
        &self,
        ctx: &mut ExecutionContext,
        params: &Map<String, Value>,
    ) -> Result<StepOutcome> {
        let params: IngestParams = decode_params(params)?;
        let delimiter = params
            .delimiter
            .as_deref()
            .and_then(|d| d.chars().next())
            .unwrap_or(',');

        let bytes = self.storage.get(&params.source_url).await.map_err(|e| {
            RuntimeError::component(format!("source file unavailable ({}): {e}", params.source_url))
        })?;

        let original_filename = params
            .source_url
            .rsplit('/')
            .next()
            .unwrap_or(&params.source_url)
            .to_string();
        let stem = original_filename
            .rsplit_once('.')
            .map_or(original_filename.as_str(), |(stem, _)| stem);

        let content_hash = canonical::digest_prefixed(&bytes);
        let data = parse_csv(&String::from_utf8_lossy(&bytes), delimiter);
        let doc_id = DocId::generate().to_string();

        let seq = SequenceCounter::new(Arc::clone(&self.storage), StorePaths::raw_seq())
            .next()
            .await?;
        let filename = artifact_filename(
            "raw",
            seq,
            ctx.utid,
            &format!("_{}_{stem}_v{}", ctx.agency, ctx.manifest_version),
        );
        let destination = format!("{}/{filename}", StorePaths::raw_dir(&ctx.agency));

        let envelope = ArtifactEnvelope {
            metadata: EnvelopeMetadata {
                utid: ctx.utid,
                doc_id: Some(doc_id.clone()),
                doc_ids: Vec::new(),
                curation_utid: None,
                manifest_id: ctx.manifest_id.clone(),
                manifest_version: ctx.manifest_version.clone(),
                manifest_schema_version: Some(
                    ctx.manifest.evolution.manifest_schema_version.clone(),
                ),
                data_schema_version: Some(ctx.manifest.evolution.data_schema_version.clone()),
                engine: None,
                engine_version: None,
                content_hash: Some(content_hash),
                source: Some(original_filename.clone()),
                source_manifest_ref: None,
                domain: None,
                record_count: data.len() as u64,
                created_at: Utc::now(),
                data_model: None,
            },
            context: Map::new(),
            data,
        };
        write_envelope(&self.storage, &destination, &envelope).await?;

        ctx.doc_id = Some(doc_id);
        ctx.ingested_file = Some(destination);

        Ok(
            StepOutcome::new(format!("INGEST_SUCCESS: {original_filename} -> {filename}"))
                .with_lineage(original_filename, filename),
        )
    }
}

// ============================================================================
// csv_parser
// ============================================================================

/// Reads parsed data back out of the raw envelope.
///
/// In replay mode the lookup UTID is the replay source, so the historical
/// raw artifact is read instead of anything the (skipped) ingestion phase
/// would have produced.
pub struct CsvParser {
    storage: Arc<dyn StorageBackend>,
}

#[async_trait]
impl Component for CsvParser {
    fn descriptor(&self) -> ComponentDescriptor {
        ComponentDescriptor {
            version: "1.0.0",
            interface: "strata.interfaces.parse.v1",
        }
    }

    async fn invoke(
        &self,
        ctx: &mut ExecutionContext,
        _params: &Map<String, Value>,
    ) -> Result<StepOutcome> {
        let lookup = ctx.raw_lookup_utid();

        let path = match ctx.ingested_file.clone() {
            Some(path) => path,
            None => find_artifact_by_utid(&self.storage, &format!("{}/", StorePaths::RAW), lookup)
                .await?
                .ok_or_else(|| {
                    if ctx.replay_mode {
                        RuntimeError::component(format!(
                            "no raw artifact found for source UTID {lookup}; \
                             the historical raw data may have been deleted"
                        ))
                    } else {
                        RuntimeError::component(format!(
                            "no ingested file found for UTID {lookup}; \
                             ensure the ingestion step ran successfully"
                        ))
                    }
                })?,
        };

        let envelope = read_envelope(&self.storage, &path).await?;
        if let Some(doc_id) = envelope.metadata.doc_id.clone() {
            ctx.doc_id = Some(doc_id);
        }

        let rows = envelope.data.len();
        let cols = envelope
            .data
            .first()
            .and_then(Value::as_object)
            .map_or(0, Map::len);
        let filename = path.rsplit('/').next().unwrap_or(&path).to_string();
        ctx.ingested_file = Some(path.clone());
        ctx.set("parsed_data", Value::Array(envelope.data));

        let mode_tag = if ctx.replay_mode { " [REPLAY]" } else { "" };
        Ok(StepOutcome::new(format!(
            "PARSE_SUCCESS{mode_tag}: {rows} rows x {cols} cols from {filename}"
        )))
    }
}

// ============================================================================
// field_mapper
// ============================================================================

/// Renames fields from the source schema to the canonical schema.
pub struct FieldMapper;

#[derive(Deserialize)]
struct FieldMapperParams {
    #[serde(default)]
    mappings: BTreeMap<String, String>,
}

#[async_trait]
impl Component for FieldMapper {
    fn descriptor(&self) -> ComponentDescriptor {
        ComponentDescriptor {
            version: "1.0.0",
            interface: "strata.interfaces.transform.v1",
        }
    }

    async fn invoke(
        &self,
        ctx: &mut ExecutionContext,
        params: &Map<String, Value>,
    ) -> Result<StepOutcome> {
        let params: FieldMapperParams = decode_params(params)?;
        if params.mappings.is_empty() {
            return Ok(StepOutcome::new("FIELD_MAP_SKIPPED: No mappings"));
        }
        let Some(parsed) = ctx.get_array("parsed_data").cloned() else {
            return Ok(StepOutcome::new("FIELD_MAP_SKIPPED: No data"));
        };

        let mapped: Vec<Value> = parsed
            .into_iter()
            .map(|record| match record {
                Value::Object(fields) => {
                    let mut renamed = Map::new();
                    for (key, value) in fields {
                        let target = params.mappings.get(&key).cloned().unwrap_or(key);
                        renamed.insert(target, value);
                    }
                    Value::Object(renamed)
                }
                other => other,
            })
            .collect();

        ctx.set("parsed_data", Value::Array(mapped));

        let fields: Vec<&String> = params.mappings.keys().collect();
        Ok(StepOutcome::new(format!("FIELD_MAP_SUCCESS: Mapped {fields:?}")))
    }
}

// ============================================================================
// reference_enricher
// ============================================================================

/// Adds a derived field using a reference-data mapping deployed next to the
/// manifest.
pub struct ReferenceEnricher {
    storage: Arc<dyn StorageBackend>,
}

#[derive(Deserialize)]
struct EnricherParams {
    source_field: String,
    target_field: String,
    mapping_ref: String,
}

#[async_trait]
impl Component for ReferenceEnricher {
    fn descriptor(&self) -> ComponentDescriptor {
        ComponentDescriptor {
            version: "1.0.0",
            interface: "strata.interfaces.enrich.v1",
        }
    }

    async fn invoke(
        &self,
        ctx: &mut ExecutionContext,
        params: &Map<String, Value>,
    ) -> Result<StepOutcome> {
        let params: EnricherParams = decode_params(params)?;
        let Some(parsed) = ctx.get_array("parsed_data").cloned() else {
            return Ok(StepOutcome::new("ENRICH_SKIPPED: No parsed data to enrich"));
        };

        let Some(reference) = ctx.manifest.reference_data.get(&params.mapping_ref) else {
            let available: Vec<&String> = ctx.manifest.reference_data.keys().collect();
            return Err(RuntimeError::component(format!(
                "reference data '{}' not found in manifest; available: {available:?}",
                params.mapping_ref
            )));
        };

        let path = StorePaths::reference_data(
            ctx.layer,
            &ctx.agency,
            &reference.path,
            &reference.version,
        );
        let bytes = self.storage.get(&path).await.map_err(|e| {
            RuntimeError::component(format!("reference data file unavailable ({path}): {e}"))
        })?;
        let reference_doc: Value = serde_json::from_slice(&bytes)
            .map_err(|e| RuntimeError::component(format!("corrupt reference data {path}: {e}")))?;
        let mappings = reference_doc
            .get("mappings")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let mappings_lower: Map<String, Value> = mappings
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect();

        let total = parsed.len();
        let mut enriched_count = 0usize;
        let mut unmapped = std::collections::BTreeSet::new();
        let enriched: Vec<Value> = parsed
            .into_iter()
            .map(|record| {
                let Value::Object(mut fields) = record else {
                    return record;
                };
                let source_value = fields.get(&params.source_field).cloned();
                let code = source_value.as_ref().and_then(Value::as_str).and_then(|name| {
                    mappings
                        .get(name)
                        .or_else(|| mappings_lower.get(&name.to_lowercase()))
                        .cloned()
                });
                match code {
                    Some(code) => {
                        fields.insert(params.target_field.clone(), code);
                        enriched_count += 1;
                    }
                    None => {
                        fields.insert(params.target_field.clone(), Value::Null);
                        if let Some(name) = source_value.as_ref().and_then(Value::as_str) {
                            unmapped.insert(name.to_string());
                        }
                    }
                }
                Value::Object(fields)
            })
            .collect();

        ctx.set("enriched_data", Value::Array(enriched));

        let mut summary = format!(
            "ENRICH_SUCCESS: Added {} to {enriched_count}/{total} records",
            params.target_field
        );
        if !unmapped.is_empty() {
            let names: Vec<String> = unmapped.into_iter().collect();
            summary.push_str(&format!(" (unmapped: {})", names.join(", ")));
        }
        Ok(StepOutcome::new(summary))
    }
}

// ============================================================================
// validate_quality
// ============================================================================

/// Validates the working dataset against the manifest's data-model quality
/// checks (`not_null`, `positive`, `range`).
pub struct QualityValidator {
    storage: Arc<dyn StorageBackend>,
}

#[async_trait]
impl Component for QualityValidator {
    fn descriptor(&self) -> ComponentDescriptor {
        ComponentDescriptor {
            version: "1.0.0",
            interface: "strata.interfaces.validate.v1",
        }
    }

    async fn invoke(
        &self,
        ctx: &mut ExecutionContext,
        _params: &Map<String, Value>,
    ) -> Result<StepOutcome> {
        let Some(model_ref) = ctx.manifest.data_model.clone() else {
            ctx.set("data_model_validated", Value::Null);
            return Ok(StepOutcome::new("VALIDATE_SKIPPED: No data_model defined"));
        };

        let path = StorePaths::data_model(ctx.layer, &ctx.agency, &model_ref.path);
        let data_model: Value = match self.storage.get(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| RuntimeError::component(format!("corrupt data model {path}: {e}")))?,
            Err(strata_core::Error::NotFound(_)) => {
                ctx.set("data_model_validated", Value::Null);
                return Ok(StepOutcome::new("VALIDATE_SKIPPED: No data_model defined"));
            }
            Err(e) => return Err(e.into()),
        };

        let Some(data) = ctx.working_data().cloned() else {
            ctx.set("data_model_validated", data_model);
            return Ok(StepOutcome::new("VALIDATE_SKIPPED: No data to validate"));
        };

        let mut validated_columns = Vec::new();
        let mut total_checks = 0u64;
        let mut total_passed = 0u64;

        let columns = data_model
            .get("columns")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for column in &columns {
            let column_name = column
                .get("column_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let checks = column
                .get("quality_checks")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            let mut column_passed = true;
            let mut column_failed_count = 0u64;
            let mut check_results = Vec::new();

            for check in &checks {
                let check_type = check.get("check").and_then(Value::as_str).unwrap_or_default();
                let check_params = check.get("params").cloned().unwrap_or(Value::Null);

                let failed_records = data
                    .iter()
                    .filter(|record| {
                        let value = record.get(&column_name).unwrap_or(&Value::Null);
                        !run_check(check_type, value, &check_params)
                    })
                    .count() as u64;

                let check_passed = failed_records == 0;
                total_checks += 1;
                if check_passed {
                    total_passed += 1;
                } else {
                    column_passed = false;
                    column_failed_count += failed_records;
                }

                check_results.push(serde_json::json!({
                    "check": check_type,
                    "passed": check_passed,
                    "failed_count": failed_records,
                }));
            }

            validated_columns.push(serde_json::json!({
                "column_name": column_name,
                "data_type": column.get("data_type").cloned().unwrap_or(Value::Null),
                "constraints": column.get("constraints").cloned().unwrap_or_else(|| Value::Object(Map::new())),
                "semantic_definition": column.get("semantic_definition").cloned().unwrap_or_else(|| Value::from("")),
                "data_quality": {
                    "passed": column_passed,
                    "failed_count": column_failed_count,
                    "checks": check_results,
                },
            }));
        }

        let validated = serde_json::json!({
            "schema_version": data_model.get("schema_version").cloned().unwrap_or_else(|| Value::from("1.0.0")),
            "semantic_definition": data_model.get("semantic_definition").cloned().unwrap_or_else(|| Value::from("")),
            "column_count": data_model.get("column_count").cloned().unwrap_or_else(|| Value::from(validated_columns.len())),
            "columns": validated_columns,
        });
        ctx.set("data_model_validated", validated);

        let status = if total_passed == total_checks { "PASSED" } else { "FAILED" };
        Ok(StepOutcome::new(format!(
            "VALIDATE_SUCCESS: {status} - {total_passed}/{total_checks} checks passed"
        )))
    }
}

fn run_check(check_type: &str, value: &Value, params: &Value) -> bool {
    match check_type {
        "not_null" => match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        },
        "positive" => as_number(value).is_some_and(|n| n > 0.0),
        "range" => as_number(value).is_some_and(|n| {
            let min = params.get("min").and_then(Value::as_f64).unwrap_or(f64::NEG_INFINITY);
            let max = params.get("max").and_then(Value::as_f64).unwrap_or(f64::INFINITY);
            n >= min && n <= max
        }),
        // Unknown check types pass by default.
        _ => true,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// fact_writer
// ============================================================================

/// Writes the curated dataset to the fact store with a full provenance
/// header.
pub struct FactWriter {
    storage: Arc<dyn StorageBackend>,
}

#[async_trait]
impl Component for FactWriter {
    fn descriptor(&self) -> ComponentDescriptor {
        ComponentDescriptor {
            version: "1.0.0",
            interface: "strata.interfaces.output.v1",
        }
    }

    async fn invoke(
        &self,
        ctx: &mut ExecutionContext,
        _params: &Map<String, Value>,
    ) -> Result<StepOutcome> {
        let Some(data) = ctx.working_data().cloned() else {
            return Ok(StepOutcome::new("WRITE_SKIPPED: No data to write"));
        };

        let content_hash = canonical::digest_prefixed(&canonical::to_canonical_bytes(&data)?);
        let seq = SequenceCounter::new(Arc::clone(&self.storage), StorePaths::fact_seq())
            .next()
            .await?;
        let filename = artifact_filename(
            "fact",
            seq,
            ctx.utid,
            &format!("_{}_v{}", ctx.manifest_id, ctx.manifest_version),
        );
        let destination = format!("{}/{filename}", StorePaths::fact_dir(&ctx.agency));

        let source = ctx
            .ingested_file
            .as_deref()
            .map(|p| p.rsplit('/').next().unwrap_or(p).to_string());
        let data_model = ctx
            .get("data_model_validated")
            .filter(|v| !v.is_null())
            .cloned();

        let envelope = ArtifactEnvelope {
            metadata: EnvelopeMetadata {
                utid: ctx.utid,
                doc_id: ctx.doc_id.clone(),
                doc_ids: Vec::new(),
                curation_utid: None,
                manifest_id: ctx.manifest_id.clone(),
                manifest_version: ctx.manifest_version.clone(),
                manifest_schema_version: Some(
                    ctx.manifest.evolution.manifest_schema_version.clone(),
                ),
                data_schema_version: Some(ctx.manifest.evolution.data_schema_version.clone()),
                engine: Some(ctx.engine.clone()),
                engine_version: Some(ctx.engine_version.clone()),
                content_hash: Some(content_hash),
                source,
                source_manifest_ref: None,
                domain: None,
                record_count: data.len() as u64,
                created_at: Utc::now(),
                data_model,
            },
            context: Map::new(),
            data: data.clone(),
        };
        write_envelope(&self.storage, &destination, &envelope).await?;

        ctx.set("fact_store_path", Value::from(destination));

        Ok(
            StepOutcome::new(format!("WRITE_SUCCESS: {} records -> {filename}", data.len()))
                .with_artifact(filename),
        )
    }
}

// ============================================================================
// CSV parsing
// ============================================================================

/// Parses delimiter-separated text into JSON records, inferring numeric
/// scalars. Empty cells become nulls.
pub(crate) fn parse_csv(text: &str, delimiter: char) -> Vec<Value> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return Vec::new();
    };
    let headers: Vec<&str> = header_line.split(delimiter).map(str::trim).collect();

    lines
        .map(|line| {
            let cells: Vec<&str> = line.split(delimiter).map(str::trim).collect();
            let mut record = Map::new();
            for (i, header) in headers.iter().enumerate() {
                let raw = cells.get(i).copied().unwrap_or("");
                record.insert((*header).to_string(), infer_scalar(raw));
            }
            Value::Object(record)
        })
        .collect()
}

fn infer_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(integer) = raw.parse::<i64>() {
        return Value::from(integer);
    }
    if let Ok(float) = raw.parse::<f64>() {
        if float.is_finite() {
            return Value::from(float);
        }
    }
    Value::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_parsing_infers_scalars() {
        let rows = parse_csv("state,year,rate\nCalifornia,2023,4.8\nTexas,2023,\n", ',');
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["state"], Value::from("California"));
        assert_eq!(rows[0]["year"], Value::from(2023));
        assert_eq!(rows[0]["rate"], Value::from(4.8));
        assert_eq!(rows[1]["rate"], Value::Null);
    }

    #[test]
    fn csv_parsing_handles_empty_input() {
        assert!(parse_csv("", ',').is_empty());
        assert!(parse_csv("header_only\n", ',').is_empty());
    }

    #[test]
    fn quality_checks() {
        assert!(run_check("not_null", &Value::from("x"), &Value::Null));
        assert!(!run_check("not_null", &Value::Null, &Value::Null));
        assert!(!run_check("not_null", &Value::from("  "), &Value::Null));

        assert!(run_check("positive", &Value::from(3), &Value::Null));
        assert!(!run_check("positive", &Value::from(0), &Value::Null));
        assert!(run_check("positive", &Value::from("4.2"), &Value::Null));

        let params = serde_json::json!({"min": 0, "max": 100});
        assert!(run_check("range", &Value::from(55), &params));
        assert!(!run_check("range", &Value::from(101), &params));

        // Unknown checks pass by default.
        assert!(run_check("entropy", &Value::Null, &Value::Null));
    }
}
