//! trl-config
//!
//! Layered YAML configuration for the ledger.
//! - Later documents override earlier ones (deep merge of mappings)
//! - The merged document is canonicalized to JSON and hashed (SHA-256), so
//!   two runs with the same effective config carry the same `config_hash`
//! - The `ledger:` section deserializes into a validated [`LedgerConfig`];
//!   every field has a default
//! - Keys nothing reads are reported by [`report_unused_keys`]

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use trl_ledger::LedgerConfig;

mod unused;

pub use unused::{consumed_pointers, report_unused_keys, UnusedKeyPolicy, UnusedKeyReport};

/// JSON pointer of the section [`LedgerConfig`] is read from.
pub const LEDGER_SECTION: &str = "/ledger";

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
    pub ledger: LedgerConfig,
}

pub fn load_layered_yaml<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let p = p.as_ref();
        let raw = fs::read_to_string(p)
            .with_context(|| format!("failed to read yaml path: {}", p.display()))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for (i, raw) in yaml_docs.iter().enumerate() {
        let v_yaml: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml in layer {i}"))?;
        // An empty document parses as null; treat it as an empty layer.
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    let ledger = ledger_config(&merged)?;
    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
        ledger,
    })
}

/// Typed, validated `ledger:` section; defaults when absent.
pub fn ledger_config(config_json: &Value) -> Result<LedgerConfig> {
    let cfg = match config_json.pointer(LEDGER_SECTION) {
        None | Some(Value::Null) => LedgerConfig::default(),
        Some(section) => serde_json::from_value(section.clone())
            .context("CONFIG_INVALID: ledger section does not match LedgerConfig")?,
    };
    cfg.validate().context("CONFIG_INVALID")?;
    Ok(cfg)
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// serde_json's default map is ordered by key, so serializing the merged
/// value is already canonical.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(v).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
