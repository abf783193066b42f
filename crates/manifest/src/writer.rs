use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use metrics::counter;
use rollwave_core::{Wave, APPLY_TYPE_ANNOTATION, APPLY_TYPE_MERGE};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::info;

use crate::Manifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestCategory {
    ExtraManifests,
    PolicyManifests,
}

impl ManifestCategory {
    pub fn dir_name(&self) -> &'static str {
        match self {
            ManifestCategory::ExtraManifests => "extra-manifests",
            ManifestCategory::PolicyManifests => "policy-manifests",
        }
    }
}

fn strip_noisy(mut v: Json) -> Json {
    if let Some(meta) = v.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("managedFields");
        meta.remove("resourceVersion");
        meta.remove("generation");
        meta.remove("creationTimestamp");
        meta.remove("uid");
    }
    if let Some(obj) = v.as_object_mut() { obj.remove("status"); }
    v
}

fn mark_merge(v: &mut Json) -> Result<()> {
    let obj = v.as_object_mut().ok_or_else(|| anyhow!("manifest is not a mapping"))?;
    let meta = obj.entry("metadata").or_insert_with(|| Json::Object(Default::default()));
    let meta = meta.as_object_mut().ok_or_else(|| anyhow!("metadata is not a mapping"))?;
    let anns = meta.entry("annotations").or_insert_with(|| Json::Object(Default::default()));
    let anns = anns.as_object_mut().ok_or_else(|| anyhow!("metadata.annotations is not a mapping"))?;
    anns.insert(APPLY_TYPE_ANNOTATION.into(), Json::String(APPLY_TYPE_MERGE.into()));
    Ok(())
}

/// Writes waves as `<root>/<category>/group<N>/<seq>_<Kind>_<name>_<namespace>.yaml`.
pub struct ManifestWriter {
    root: PathBuf,
}

impl ManifestWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path { &self.root }

    /// Stops at the first failure; files already written stay on disk.
    pub fn write(&self, category: ManifestCategory, waves: &[Wave<Manifest>]) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (i, wave) in waves.iter().enumerate() {
            let group = self.root.join(category.dir_name()).join(format!("group{}", i + 1));
            fs::create_dir_all(&group).with_context(|| format!("creating {}", group.display()))?;
            for (j, manifest) in wave.items.iter().enumerate() {
                let file = format!("{}_{}_{}_{}.yaml", j + 1, manifest.kind(), manifest.name(), manifest.namespace().unwrap_or_default());
                let path = group.join(file);
                let mut obj = strip_noisy(manifest.object.clone());
                mark_merge(&mut obj).with_context(|| format!("preparing {}", manifest))?;
                let text = serde_yaml::to_string(&obj).with_context(|| format!("serializing {}", manifest))?;
                fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
                counter!("manifest_written_total", 1u64);
                written.push(path);
            }
        }
        info!(category = category.dir_name(), files = written.len(), root = %self.root.display(), "wrote manifests");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollwave_core::group_into_waves;
    use serde_json::json;

    fn temp_root(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        std::env::temp_dir().join(format!("rollwave-writer-{}-{}", tag, nanos))
    }

    #[test]
    fn strip_noisy_prunes_server_fields() {
        let v = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "x",
                "managedFields": [ {"foo": "bar"} ],
                "resourceVersion": "123",
                "generation": 5,
                "uid": "u",
                "creationTimestamp": "2020-01-01T00:00:00Z"
            },
            "status": { "obs": true },
            "data": { "k": "v" }
        });
        let pruned = strip_noisy(v);
        assert_eq!(pruned, json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "x"}, "data": {"k": "v"}}));
    }

    #[test]
    fn layout_follows_wave_and_sequence() {
        let root = temp_root("layout");
        let mk = |kind: &str, name: &str, ns: Option<&str>, wave: &str| {
            let mut obj = json!({"apiVersion": "v1", "kind": kind, "metadata": {"name": name, "annotations": {rollwave_core::APPLY_WAVE_ANNOTATION: wave}}, "status": {"x": 1}});
            if let Some(ns) = ns { obj["metadata"]["namespace"] = json!(ns); }
            Manifest::new(name, obj)
        };
        let waves = group_into_waves(vec![
            mk("ConfigMap", "b", Some("ns1"), "5"),
            mk("Namespace", "ns1", None, "1"),
            mk("ConfigMap", "a", Some("ns1"), "5"),
        ])
        .unwrap();
        let files = ManifestWriter::new(&root).write(ManifestCategory::ExtraManifests, &waves).unwrap();
        let rel: Vec<String> = files.iter().map(|p| p.strip_prefix(&root).unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(rel, vec![
            "extra-manifests/group1/1_Namespace_ns1_.yaml",
            "extra-manifests/group2/1_ConfigMap_a_ns1.yaml",
            "extra-manifests/group2/2_ConfigMap_b_ns1.yaml",
        ]);
        let text = std::fs::read_to_string(&files[1]).unwrap();
        let back: Json = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back["metadata"]["annotations"][APPLY_TYPE_ANNOTATION], APPLY_TYPE_MERGE);
        assert!(back.get("status").is_none());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn non_mapping_manifest_aborts() {
        let root = temp_root("abort");
        let waves = vec![Wave { tag: 1, items: vec![Manifest::new("x", json!("scalar"))] }];
        assert!(ManifestWriter::new(&root).write(ManifestCategory::PolicyManifests, &waves).is_err());
        let _ = std::fs::remove_dir_all(&root);
    }
}
