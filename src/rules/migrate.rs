//! Versioned upgrade of stored rule records.
//!
//! Version 1 kept `last_run_iso` / `last_match_iso` at the top level of the
//! rule. Version 2 moves all evaluation bookkeeping into the nested `state`
//! object. Upgrades run once, at load time, on the raw JSON.

use super::types::{RULE_SCHEMA_VERSION, Rule};
use serde_json::{Map, Value};

const LEGACY_STATE_FIELDS: &[(&str, &str)] = &[
    ("last_run_iso", "last_run"),
    ("last_match_iso", "last_match"),
];

/// Parse a stored record, upgrading it to the current schema first.
pub fn upgrade(value: Value) -> Result<Rule, String> {
    let Value::Object(mut record) = value else {
        return Err("rule record is not a JSON object".into());
    };

    let version = stored_version(&record);
    if version > RULE_SCHEMA_VERSION {
        return Err(format!(
            "unsupported schema_version {version} (newest known is {RULE_SCHEMA_VERSION})"
        ));
    }
    if version < 2 {
        v1_to_v2(&mut record);
    }

    serde_json::from_value(Value::Object(record)).map_err(|e| e.to_string())
}

fn stored_version(record: &Map<String, Value>) -> u32 {
    record
        .get("schema_version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(1)
}

fn v1_to_v2(record: &mut Map<String, Value>) {
    let legacy: Vec<(&str, Value)> = LEGACY_STATE_FIELDS
        .iter()
        .filter_map(|(old, new)| {
            record
                .remove(*old)
                .filter(|v| !v.is_null())
                .map(|v| (*new, v))
        })
        .collect();

    let state = record
        .entry("state")
        .or_insert_with(|| Value::Object(Map::new()));
    if !state.is_object() {
        *state = Value::Object(Map::new());
    }
    if let Value::Object(state) = state {
        for (field, value) in legacy {
            let legacy_alias = format!("{field}_iso");
            let present = [field, legacy_alias.as_str()]
                .iter()
                .any(|k| state.get(*k).is_some_and(|v| !v.is_null()));
            if !present {
                state.insert(field.to_string(), value);
            }
        }
    }

    record.insert("schema_version".into(), Value::from(2));
}
