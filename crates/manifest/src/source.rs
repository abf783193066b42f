use rollwave_core::{yaml::{decode_each, require_type_meta}, Resource};
use tracing::debug;

use crate::Manifest;

/// Raw text holding one or more `---` separated manifests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSource {
    pub origin: String,
    pub text: String,
}

impl ManifestSource {
    pub fn new(origin: impl Into<String>, text: impl Into<String>) -> Self {
        Self { origin: origin.into(), text: text.into() }
    }
}

/// One source per `data` entry of every ConfigMap, in input order.
pub fn sources_from_config_maps(config_maps: &[Resource]) -> Vec<ManifestSource> {
    let mut out = Vec::new();
    for cm in config_maps {
        let Some(data) = cm.rest.get("data").and_then(|d| d.as_object()) else { continue };
        for (key, value) in data {
            let text = value.as_str().unwrap_or_default();
            out.push(ManifestSource::new(format!("{} in the configMap {}", key, cm.name()), text));
        }
    }
    out
}

/// Decode every source. Broken documents become error strings naming their
/// origin instead of failing the batch.
pub fn decode_sources(sources: &[ManifestSource]) -> (Vec<Manifest>, Vec<String>) {
    let mut manifests = Vec::new();
    let mut errors = Vec::new();
    for src in sources {
        let docs = match decode_each(&src.text) {
            Ok(docs) => docs,
            Err(e) => {
                errors.push(format!("failed to decode {}: {:#}", src.origin, e));
                continue;
            }
        };
        for doc in docs {
            let doc = match doc {
                Ok(doc) => doc,
                Err(e) => {
                    errors.push(format!("failed to decode {}: {:#}", src.origin, e));
                    continue;
                }
            };
            if let Err(e) = require_type_meta(&doc) {
                errors.push(format!("failed to decode {}: {}", src.origin, e));
                continue;
            }
            manifests.push(Manifest::new(src.origin.clone(), doc));
        }
    }
    debug!(sources = sources.len(), manifests = manifests.len(), errors = errors.len(), "decoded manifest sources");
    (manifests, errors)
}
