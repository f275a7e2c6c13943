//! Semantic components of the `local` engine.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use strata_core::storage::StorageBackend;

use crate::component::{Component, ComponentDescriptor, StepOutcome};
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::resolver::EngineRegistry;

/// Registers the semantic components under their `local` engine namespace.
pub(crate) fn register(registry: &mut EngineRegistry, _storage: &Arc<dyn StorageBackend>) {
    registry.register_component(
        "engines.semantic.local.v1.ontology_mapper.run",
        Arc::new(OntologyMapper),
    );
}

/// Generic JSON-to-JSON projector: renames physical fields to semantic
/// concepts and attaches declarative context metadata.
///
/// No field names live in this code; the projection is driven entirely by
/// the manifest's `projection.mapping` rules.
pub struct OntologyMapper;

#[async_trait]
impl Component for OntologyMapper {
    fn descriptor(&self) -> ComponentDescriptor {
        ComponentDescriptor {
            version: "1.0.0",
            interface: "strata.interfaces.semantics.mapper.v1",
        }
    }

    async fn invoke(
        &self,
        ctx: &mut ExecutionContext,
        params: &Map<String, Value>,
    ) -> Result<StepOutcome> {
        let source_data = ctx
            .get("source_fact")
            .and_then(|fact| fact.get("data"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if source_data.is_empty() {
            ctx.set("projected_data", Value::Array(Vec::new()));
            return Ok(StepOutcome::new("MAP_SKIPPED: No source data"));
        }

        // mapping: [{ source_key, target_concept }]
        let mut field_map = Map::new();
        for rule in params
            .get("mapping")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if let (Some(source_key), Some(target_concept)) = (
                rule.get("source_key").and_then(Value::as_str),
                rule.get("target_concept").and_then(Value::as_str),
            ) {
                field_map.insert(source_key.to_string(), Value::from(target_concept));
            }
        }

        let context = params.get("context").cloned().unwrap_or(Value::Null);

        let projected: Vec<Value> = source_data
            .into_iter()
            .map(|record| {
                let Value::Object(fields) = record else {
                    return record;
                };
                let mut out = Map::new();
                for (key, value) in fields {
                    match field_map.get(&key).and_then(Value::as_str) {
                        Some(concept) => {
                            out.insert(concept.to_string(), value);
                        }
                        None => {
                            // Unmapped fields pass through, prefixed so the
                            // semantic namespace stays clean.
                            out.insert(format!("_raw_{key}"), value);
                        }
                    }
                }
                out.insert("__context__".to_string(), context.clone());
                Value::Object(out)
            })
            .collect();

        let count = projected.len();
        ctx.set("projected_data", Value::Array(projected));

        Ok(StepOutcome::new(format!(
            "MAP_SUCCESS: {count} records, {} fields mapped",
            field_map.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Layer, Utid};
    use strata_manifest::Manifest;

    fn ctx_with_fact(data: Value) -> ExecutionContext {
        let manifest: Manifest = serde_json::from_value(serde_json::json!({
            "identity": { "name": "ontology", "domain": "macroeconomics" },
            "evolution": { "manifest_version": "1.0.0" }
        }))
        .unwrap();
        let mut ctx =
            ExecutionContext::new(Utid::generate(), Layer::Semantics, "bls", manifest, None);
        ctx.set("source_fact", serde_json::json!({ "data": data }));
        ctx
    }

    #[tokio::test]
    async fn projection_maps_and_prefixes() {
        let mut ctx = ctx_with_fact(serde_json::json!([
            { "series_id": "UNRATE", "value": 4.8 }
        ]));
        let params = serde_json::json!({
            "mapping": [
                { "source_key": "series_id", "target_concept": "indicator_code" }
            ],
            "context": { "unit_system": "percent" }
        });
        let Value::Object(params) = params else { unreachable!() };

        let outcome = OntologyMapper.invoke(&mut ctx, &params).await.unwrap();
        assert!(outcome.summary.starts_with("MAP_SUCCESS"));

        let projected = ctx.get_array("projected_data").unwrap();
        assert_eq!(projected[0]["indicator_code"], Value::from("UNRATE"));
        assert_eq!(projected[0]["_raw_value"], Value::from(4.8));
        assert_eq!(projected[0]["__context__"]["unit_system"], Value::from("percent"));
    }

    #[tokio::test]
    async fn empty_source_is_skipped() {
        let mut ctx = ctx_with_fact(serde_json::json!([]));
        let outcome = OntologyMapper.invoke(&mut ctx, &Map::new()).await.unwrap();
        assert!(outcome.summary.starts_with("MAP_SKIPPED"));
        assert_eq!(ctx.get_array("projected_data").map(Vec::len), Some(0));
    }
}
