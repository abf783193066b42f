//! Export of the OADP operator configuration needed to rebuild backup storage access.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use rollwave_core::{Resource, ResourceKey};
use rollwave_kubehub::{cancellable, ResourceStore};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DPA_API_VERSION: &str = "oadp.openshift.io/v1alpha1";
pub const DPA_KIND: &str = "DataProtectionApplication";
/// Secret holding the object storage credentials when a location names none.
pub const DEFAULT_STORAGE_SECRET: &str = "cloud-credentials";

const DPA_DIR: &str = "oadp/dpa";
const SECRET_DIR: &str = "oadp/secret";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OadpExport {
    pub dpas: Vec<PathBuf>,
    pub secrets: Vec<PathBuf>,
}

/// Names of every `spec.backupLocations[].velero.credential.name`, in order.
pub fn credential_secrets(dpa: &Resource) -> Vec<String> {
    let Some(locations) = dpa.spec.get("backupLocations").and_then(|l| l.as_array()) else { return Vec::new() };
    locations
        .iter()
        .filter_map(|loc| loc.pointer("/velero/credential/name").and_then(|n| n.as_str()))
        .map(String::from)
        .collect()
}

fn write_object(resource: &Resource, path: &Path) -> Result<()> {
    let mut out = resource.clone();
    out.status = None;
    let text = serde_yaml::to_string(&out).with_context(|| format!("serializing {}", resource.key()))?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

fn secret_key(name: &str, namespace: &str) -> ResourceKey {
    ResourceKey::new("v1", "Secret", name, Some(namespace))
}

/// Write every DataProtectionApplication in `namespace` to `<dir>/oadp/dpa/<name>.yaml`
/// and the secrets they use to `<dir>/oadp/secret/<name>.yaml`.
///
/// The default storage secret is optional. A secret named by a backup location
/// must exist.
pub async fn export_oadp_to_dir(store: &dyn ResourceStore, namespace: &str, dir: &Path, cancel: &CancellationToken) -> Result<OadpExport> {
    let dpa_dir = dir.join(DPA_DIR);
    let secret_dir = dir.join(SECRET_DIR);
    for d in [&dpa_dir, &secret_dir] {
        fs::create_dir_all(d).with_context(|| format!("creating {}", d.display()))?;
    }

    let mut export = OadpExport::default();
    let mut written: Vec<String> = Vec::new();

    match cancellable(cancel, store.get(&secret_key(DEFAULT_STORAGE_SECRET, namespace))).await? {
        Some(secret) => {
            let path = secret_dir.join(format!("{}.yaml", DEFAULT_STORAGE_SECRET));
            write_object(&secret, &path)?;
            export.secrets.push(path);
            written.push(DEFAULT_STORAGE_SECRET.to_string());
        }
        None => debug!(namespace = %namespace, "no default storage secret"),
    }

    let dpas = cancellable(cancel, store.list(DPA_API_VERSION, DPA_KIND, Some(namespace), None)).await?;
    for dpa in &dpas {
        let path = dpa_dir.join(format!("{}.yaml", dpa.name()));
        write_object(dpa, &path)?;
        export.dpas.push(path);

        for name in credential_secrets(dpa) {
            if written.contains(&name) {
                continue;
            }
            let secret = cancellable(cancel, store.get(&secret_key(&name, namespace)))
                .await?
                .ok_or_else(|| anyhow!("secret {}/{} used by {} {} is not found", namespace, name, DPA_KIND, dpa.name()))?;
            let path = secret_dir.join(format!("{}.yaml", name));
            write_object(&secret, &path)?;
            export.secrets.push(path);
            written.push(name);
        }
    }
    info!(dir = %dir.display(), dpas = export.dpas.len(), secrets = export.secrets.len(), "exported oadp configuration");
    Ok(export)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credential_names_skip_locations_without_one() {
        let dpa = Resource::new(DPA_API_VERSION, DPA_KIND, "dpa", Some("adp")).with_spec(json!({
            "backupLocations": [
                {"velero": {"credential": {"name": "s3-creds", "key": "cloud"}}},
                {"velero": {"provider": "aws"}},
                {"bucket": {"name": "b"}},
                {"velero": {"credential": {"name": "cloud-credentials"}}},
            ]
        }));
        assert_eq!(credential_secrets(&dpa), vec!["s3-creds", "cloud-credentials"]);
        assert!(credential_secrets(&Resource::new(DPA_API_VERSION, DPA_KIND, "bare", Some("adp"))).is_empty());
    }
}
