//! Retrieval components of the `local` engine.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use strata_core::storage::StorageBackend;

use crate::component::{Component, ComponentDescriptor, StepOutcome};
use crate::context::ExecutionContext;
use crate::engines::decode_params;
use crate::error::Result;
use crate::resolver::EngineRegistry;

/// Registers the retrieval components under their `local` engine namespace.
pub(crate) fn register(registry: &mut EngineRegistry, _storage: &Arc<dyn StorageBackend>) {
    registry.register_component(
        "engines.retrieval.local.v1.temporal_joiner.run",
        Arc::new(TemporalJoiner),
    );
}

/// Generic cross-domain join over the bound semantic projections.
///
/// Matches primary and secondary records on a shared key and merges their
/// fields under `primary_`/`secondary_` prefixes. Complex math belongs in
/// dedicated components, referenced explicitly by the manifest; this is a
/// joiner, nothing more.
pub struct TemporalJoiner;

#[derive(Deserialize)]
struct JoinerParams {
    join_key: String,
    #[serde(default = "default_join_type")]
    join_type: String,
}

fn default_join_type() -> String {
    "inner".to_string()
}

#[async_trait]
impl Component for TemporalJoiner {
    fn descriptor(&self) -> ComponentDescriptor {
        ComponentDescriptor {
            version: "1.0.0",
            interface: "strata.interfaces.retrieval.joiner.v1",
        }
    }

    async fn invoke(
        &self,
        ctx: &mut ExecutionContext,
        params: &Map<String, Value>,
    ) -> Result<StepOutcome> {
        let params: JoinerParams = decode_params(params)?;

        let primary = ctx.get("primary_data").cloned().unwrap_or(Value::Null);
        let secondary = ctx.get("secondary_data").cloned();
        let primary_records = primary
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let primary_source = source_id(&primary);

        // No secondary source: pass primary through with join metadata.
        let Some(secondary) = secondary.filter(|s| !s.is_null()) else {
            let joined: Vec<Value> = primary_records
                .into_iter()
                .map(|record| {
                    let mut out = record.as_object().cloned().unwrap_or_default();
                    out.insert(
                        "__join__".to_string(),
                        serde_json::json!({
                            "type": "passthrough",
                            "sources": [primary_source],
                        }),
                    );
                    Value::Object(out)
                })
                .collect();
            let count = joined.len();
            ctx.set("joined_data", Value::Array(joined));
            return Ok(StepOutcome::new(format!(
                "JOIN_PASSTHROUGH: {count} records (no secondary source)"
            )));
        };

        let secondary_records = secondary
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let secondary_source = source_id(&secondary);

        // Index the secondary side on the join key.
        let mut lookup: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
        for record in &secondary_records {
            if let Some(key) = join_key_of(record, &params.join_key) {
                lookup.entry(key).or_default().push(record);
            }
        }

        let mut joined = Vec::new();
        let mut matched = 0usize;

        for primary_record in &primary_records {
            let key = join_key_of(primary_record, &params.join_key);
            let matches = key.as_ref().and_then(|k| lookup.get(k));

            match matches {
                Some(matches) => {
                    for secondary_record in matches {
                        let mut out = Map::new();
                        merge_prefixed(&mut out, primary_record, "primary_");
                        merge_prefixed(&mut out, secondary_record, "secondary_");
                        out.insert(
                            "__join__".to_string(),
                            serde_json::json!({
                                "type": params.join_type,
                                "key": params.join_key,
                                "key_value": primary_record.get(&params.join_key),
                                "sources": [primary_source, secondary_source],
                            }),
                        );
                        joined.push(Value::Object(out));
                        matched += 1;
                    }
                }
                None => {
                    if params.join_type == "inner" {
                        continue;
                    }
                    let mut out = Map::new();
                    merge_prefixed(&mut out, primary_record, "primary_");
                    out.insert(
                        "__join__".to_string(),
                        serde_json::json!({
                            "type": params.join_type,
                            "key": params.join_key,
                            "key_value": primary_record.get(&params.join_key),
                            "matched": false,
                            "sources": [primary_source],
                        }),
                    );
                    joined.push(Value::Object(out));
                }
            }
        }

        let count = joined.len();
        ctx.set("joined_data", Value::Array(joined));

        Ok(StepOutcome::new(format!(
            "JOIN_SUCCESS: {count} records ({} on {}, {matched} matches)",
            params.join_type, params.join_key
        )))
    }
}

fn source_id(envelope: &Value) -> String {
    envelope
        .get("metadata")
        .and_then(|m| m.get("manifest_id"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

/// Join keys compare by canonical string form so `2023` and `"2023"` from
/// differently typed sources still match.
fn join_key_of(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn merge_prefixed(out: &mut Map<String, Value>, record: &Value, prefix: &str) {
    if let Some(fields) = record.as_object() {
        for (key, value) in fields {
            if !key.starts_with("__") {
                out.insert(format!("{prefix}{key}"), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Layer, Utid};
    use strata_manifest::Manifest;

    fn ctx() -> ExecutionContext {
        let manifest: Manifest = serde_json::from_value(serde_json::json!({
            "identity": { "name": "outlook" },
            "evolution": { "manifest_version": "1.0.0" }
        }))
        .unwrap();
        ExecutionContext::new(Utid::generate(), Layer::Retrieval, "reports", manifest, None)
    }

    fn envelope(manifest_id: &str, data: Value) -> Value {
        serde_json::json!({ "metadata": { "manifest_id": manifest_id }, "data": data })
    }

    fn params(join_key: &str, join_type: &str) -> Map<String, Value> {
        let Value::Object(map) = serde_json::json!({
            "join_key": join_key,
            "join_type": join_type,
        }) else {
            unreachable!()
        };
        map
    }

    #[tokio::test]
    async fn inner_join_merges_matching_records() {
        let mut ctx = ctx();
        ctx.set(
            "primary_data",
            envelope("employment", serde_json::json!([
                { "observation_year": 2023, "unemployment_rate": 4.8 },
                { "observation_year": 2024, "unemployment_rate": 4.1 },
            ])),
        );
        ctx.set(
            "secondary_data",
            envelope("population", serde_json::json!([
                { "observation_year": 2023, "population": 39_500_000 },
            ])),
        );

        let outcome = TemporalJoiner
            .invoke(&mut ctx, &params("observation_year", "inner"))
            .await
            .unwrap();
        assert!(outcome.summary.starts_with("JOIN_SUCCESS"));

        let joined = ctx.get_array("joined_data").unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0]["primary_unemployment_rate"], Value::from(4.8));
        assert_eq!(joined[0]["secondary_population"], Value::from(39_500_000));
        assert_eq!(joined[0]["__join__"]["key"], Value::from("observation_year"));
    }

    #[tokio::test]
    async fn left_outer_keeps_unmatched_primary() {
        let mut ctx = ctx();
        ctx.set(
            "primary_data",
            envelope("employment", serde_json::json!([
                { "observation_year": 2023 },
                { "observation_year": 2030 },
            ])),
        );
        ctx.set(
            "secondary_data",
            envelope("population", serde_json::json!([
                { "observation_year": 2023, "population": 1 },
            ])),
        );

        TemporalJoiner
            .invoke(&mut ctx, &params("observation_year", "left_outer"))
            .await
            .unwrap();

        let joined = ctx.get_array("joined_data").unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[1]["__join__"]["matched"], Value::from(false));
    }

    #[tokio::test]
    async fn missing_secondary_is_a_passthrough() {
        let mut ctx = ctx();
        ctx.set(
            "primary_data",
            envelope("employment", serde_json::json!([{ "observation_year": 2023 }])),
        );

        let outcome = TemporalJoiner
            .invoke(&mut ctx, &params("observation_year", "inner"))
            .await
            .unwrap();
        assert!(outcome.summary.starts_with("JOIN_PASSTHROUGH"));
        let joined = ctx.get_array("joined_data").unwrap();
        assert_eq!(joined[0]["__join__"]["type"], Value::from("passthrough"));
    }
}
