//! Multi-document YAML decoding with size and complexity guards.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value as Json;

fn env_limit(var: &str, default: usize) -> usize {
    std::env::var(var).ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(default)
}

fn max_yaml_bytes() -> usize { env_limit("ROLLWAVE_MAX_YAML_BYTES", 1_000_000) }

fn max_yaml_nodes() -> usize { env_limit("ROLLWAVE_MAX_YAML_NODES", 100_000) }

/// True once `doc` holds `max` or more JSON nodes. Stops counting at the limit.
fn too_many_nodes(doc: &Json, max: usize) -> bool {
    let mut pending = vec![doc];
    let mut seen = 0usize;
    while let Some(v) = pending.pop() {
        seen += 1;
        if seen >= max {
            return true;
        }
        match v {
            Json::Object(map) => pending.extend(map.values()),
            Json::Array(items) => pending.extend(items.iter()),
            _ => {}
        }
    }
    false
}

fn decode_one(doc: serde_yaml::Deserializer<'_>) -> Result<Option<Json>> {
    let val = serde_yaml::Value::deserialize(doc).context("parsing YAML")?;
    if val.is_null() {
        return Ok(None);
    }
    let json = serde_json::to_value(val).context("converting YAML to JSON")?;
    if too_many_nodes(&json, max_yaml_nodes()) {
        return Err(anyhow!("YAML document too complex (>{} nodes)", max_yaml_nodes()));
    }
    Ok(Some(json))
}

/// Decode a `---` separated stream one document at a time.
///
/// Only the payload size check fails the whole call. Each non-empty document
/// yields its own result, so a broken document does not hide its siblings.
/// The scanner cannot resume after a syntax error, so documents following
/// one are not reported.
pub fn decode_each(text: &str) -> Result<Vec<Result<Json>>> {
    if text.len() > max_yaml_bytes() {
        return Err(anyhow!("YAML payload too large (>{} bytes)", max_yaml_bytes()));
    }
    Ok(serde_yaml::Deserializer::from_str(text)
        .filter_map(|doc| decode_one(doc).transpose())
        .collect())
}

/// Decode every non-empty document, failing on the first broken one.
pub fn decode_documents(text: &str) -> Result<Vec<Json>> {
    decode_each(text)?.into_iter().collect()
}

/// Check the type coordinates every object document must carry.
pub fn require_type_meta(doc: &Json) -> Result<(&str, &str)> {
    if !doc.is_object() {
        return Err(anyhow!("document is not a mapping"));
    }
    let api_version = doc.get("apiVersion").and_then(|v| v.as_str()).ok_or_else(|| anyhow!("document missing apiVersion"))?;
    let kind = doc.get("kind").and_then(|v| v.as_str()).ok_or_else(|| anyhow!("document missing kind"))?;
    Ok((api_version, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_multiple_documents_and_skips_empty_ones() {
        let y = "---\napiVersion: v1\nkind: Namespace\nmetadata:\n  name: a\n---\n---\napiVersion: v1\nkind: Namespace\nmetadata:\n  name: b\n";
        let docs = decode_documents(y).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["metadata"]["name"], "b");
    }

    #[test]
    fn malformed_yaml_is_reported() {
        let y = "kind: SriovNetwork\nmetadata: adsafsd\n  name: x\n";
        let e = decode_documents(y).unwrap_err();
        assert!(format!("{:#}", e).contains("parsing YAML"), "e={:#}", e);
    }

    #[test]
    fn each_document_keeps_its_own_result() {
        let y = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: a\n---\n---\nkind: SriovNetwork\nmetadata: adsafsd\n  name: x\n";
        let docs = decode_each(y).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].as_ref().unwrap()["metadata"]["name"], "a");
        let e = docs[1].as_ref().unwrap_err();
        assert!(format!("{:#}", e).contains("parsing YAML"), "e={:#}", e);
        assert!(decode_documents(y).is_err());
    }

    #[test]
    fn type_meta_errors_are_friendly() {
        let e1 = require_type_meta(&serde_json::json!({"kind": "Foo"})).unwrap_err().to_string();
        assert!(e1.contains("missing apiVersion"), "e1={}", e1);
        let e2 = require_type_meta(&serde_json::json!({"apiVersion": "v1"})).unwrap_err().to_string();
        assert!(e2.contains("missing kind"), "e2={}", e2);
        let e3 = require_type_meta(&serde_json::json!("scalar")).unwrap_err().to_string();
        assert!(e3.contains("not a mapping"), "e3={}", e3);
    }

    #[test]
    fn node_budget_detects_large_documents() {
        let v = serde_json::json!({"a": [1, 2, 3], "b": {"c": 1}});
        // root, array, three numbers, object, one number
        assert!(!too_many_nodes(&v, 8));
        assert!(too_many_nodes(&v, 7));
        assert!(too_many_nodes(&v, 3));
    }
}
