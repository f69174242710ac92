//! cge-config
//!
//! Engine configuration: an ordered stack of YAML files (base, then
//! deploy-specific overrides) merges into one document, which deserializes
//! straight into [`EngineSettings`]. A SHA-256 fingerprint over the merged
//! document's flattened `path=value` view is logged at boot so any two
//! replicas can be compared by a single line.

use anyhow::{bail, Context, Result};
use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};
use std::fs;

mod settings;

pub use settings::{
    BusSettings, DebugSettings, EngineSettings, EvaluationSettings, OutboxSettings, RedisSettings,
    RulesetSettings, ServerSettings,
};

/// Settings plus the fingerprint of the merged document they came from.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub settings: EngineSettings,
    pub fingerprint: String,
}

/// Merge the YAML files in order (later layers override earlier ones,
/// mappings merge recursively) and parse the result into typed settings.
/// An empty path list yields pure defaults with the fingerprint of an
/// empty document.
pub fn load(paths: &[&str]) -> Result<EngineConfig> {
    let mut merged = Mapping::new();

    for p in paths {
        let raw = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        let doc: Value =
            serde_yaml::from_str(&raw).with_context(|| format!("parse yaml: {p}"))?;
        let Value::Mapping(layer) = doc else {
            bail!("config root must be a mapping: {p}");
        };
        merge_mapping(&mut merged, layer);
    }

    let merged = Value::Mapping(merged);
    let fingerprint = fingerprint(&merged);
    let settings: EngineSettings = serde_yaml::from_value(merged)
        .context("invalid engine settings in merged config")?;

    Ok(EngineConfig {
        settings,
        fingerprint,
    })
}

/// Recursive override: mappings merge key-wise, everything else (scalars,
/// sequences) is replaced wholesale by the later layer.
fn merge_mapping(dst: &mut Mapping, src: Mapping) {
    for (key, incoming) in src {
        match (dst.get_mut(&key), incoming) {
            (Some(Value::Mapping(existing)), Value::Mapping(overlay)) => {
                merge_mapping(existing, overlay);
            }
            (Some(slot), incoming) => *slot = incoming,
            (None, incoming) => {
                dst.insert(key, incoming);
            }
        }
    }
}

/// SHA-256 over the sorted `path=value` lines of the document. Key order in
/// the source files cannot change the fingerprint; any effective value can.
fn fingerprint(doc: &Value) -> String {
    let mut lines = Vec::new();
    flatten("", doc, &mut lines);
    lines.sort();

    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Mapping(map) => {
            for (k, child) in map {
                let key = match k.as_str() {
                    Some(s) => s.to_string(),
                    None => format!("{k:?}"),
                };
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, out);
            }
        }
        Value::Sequence(seq) => {
            for (i, child) in seq.iter().enumerate() {
                flatten(&format!("{prefix}[{i}]"), child, out);
            }
        }
        scalar => out.push(format!("{prefix}={}", scalar_text(scalar))),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => "~".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yaml(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn later_layers_override_scalars_but_keep_sibling_keys() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_yaml(
            &dir,
            "default.yaml",
            "outbox:\n  poll_interval_ms: 50\n  pending_claim_count: 50\n",
        );
        let over = write_yaml(&dir, "override.yaml", "outbox:\n  poll_interval_ms: 10\n");

        let cfg = load(&[&base, &over]).unwrap();
        assert_eq!(cfg.settings.outbox.poll_interval_ms, 10);
        assert_eq!(cfg.settings.outbox.pending_claim_count, 50);
    }

    #[test]
    fn fingerprint_is_stable_and_tracks_effective_values() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_yaml(&dir, "a.yaml", "server:\n  bind_addr: 0.0.0.0:9000\n");
        // Same keys in a different order fingerprint identically.
        let reordered = write_yaml(
            &dir,
            "b.yaml",
            "outbox:\n  poll_interval_ms: 50\nserver:\n  bind_addr: 0.0.0.0:9000\n",
        );
        let reordered2 = write_yaml(
            &dir,
            "c.yaml",
            "server:\n  bind_addr: 0.0.0.0:9000\noutbox:\n  poll_interval_ms: 50\n",
        );

        assert_eq!(
            load(&[&reordered]).unwrap().fingerprint,
            load(&[&reordered2]).unwrap().fingerprint
        );
        assert_ne!(
            load(&[&base]).unwrap().fingerprint,
            load(&[&reordered]).unwrap().fingerprint
        );
        // Loading twice is deterministic.
        assert_eq!(
            load(&[&base]).unwrap().fingerprint,
            load(&[&base]).unwrap().fingerprint
        );
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_yaml(&dir, "default.yaml", "server:\n  bind_addr: 0.0.0.0:9000\n");

        let cfg = load(&[&base]).unwrap();
        assert_eq!(cfg.settings.server.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.settings.outbox.pending_min_idle_ms, 60_000);
        assert_eq!(cfg.settings.evaluation.debug.sample_rate, 100);
        assert!(!cfg.settings.evaluation.debug.enabled);
    }

    #[test]
    fn empty_stack_yields_pure_defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.settings.server.bind_addr, "127.0.0.1:8787");
        assert_eq!(cfg.settings.bus.topic, "fraud.card.decisions.v1");
    }

    #[test]
    fn non_mapping_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_yaml(&dir, "bad.yaml", "- just\n- a\n- list\n");
        let err = load(&[&bad]).unwrap_err();
        assert!(err.to_string().contains("mapping"));
    }
}
