//! Scripts bundled into the binary, addressed by slash-separated names.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

struct Asset {
    name: &'static str,
    bytes: &'static [u8],
    mode: u32,
}

static ASSETS: &[Asset] = &[
    Asset { name: "prep/common.sh", bytes: include_bytes!("../assets/prep/common.sh"), mode: 0o644 },
    Asset { name: "prep/prep-cleanup.sh", bytes: include_bytes!("../assets/prep/prep-cleanup.sh"), mode: 0o755 },
    Asset { name: "prep/prep-precache.sh", bytes: include_bytes!("../assets/prep/prep-precache.sh"), mode: 0o755 },
    Asset { name: "prep/prep-pull-seed.sh", bytes: include_bytes!("../assets/prep/prep-pull-seed.sh"), mode: 0o755 },
    Asset { name: "prep/prep-stateroot.sh", bytes: include_bytes!("../assets/prep/prep-stateroot.sh"), mode: 0o755 },
];

fn canonical(name: &str) -> String {
    name.replace('\\', "/").trim_matches('/').to_string()
}

fn find(name: &str) -> Option<&'static Asset> {
    let name = canonical(name);
    ASSETS.iter().find(|a| a.name == name)
}

/// Contents of one embedded file.
pub fn asset(name: &str) -> Result<&'static [u8]> {
    find(name).map(|a| a.bytes).ok_or_else(|| anyhow!("asset {} not found", name))
}

pub fn asset_names() -> Vec<&'static str> {
    ASSETS.iter().map(|a| a.name).collect()
}

/// Direct children of a directory; `""` is the root. Files and unknown names are errors.
pub fn asset_dir(name: &str) -> Result<Vec<String>> {
    let name = canonical(name);
    let prefix = if name.is_empty() { String::new() } else { format!("{}/", name) };
    let children: BTreeSet<String> = ASSETS
        .iter()
        .filter_map(|a| a.name.strip_prefix(prefix.as_str()))
        .filter_map(|rest| rest.split('/').next())
        .map(String::from)
        .collect();
    if children.is_empty() {
        return Err(anyhow!("asset directory {} not found", name));
    }
    Ok(children.into_iter().collect())
}

fn target_path(dir: &Path, name: &str) -> PathBuf {
    canonical(name).split('/').fold(dir.to_path_buf(), |p, part| p.join(part))
}

/// Write one asset under `dir`, keeping its relative path and mode.
pub fn restore_asset(dir: &Path, name: &str) -> Result<PathBuf> {
    let a = find(name).ok_or_else(|| anyhow!("asset {} not found", name))?;
    let path = target_path(dir, a.name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(&path, a.bytes).with_context(|| format!("writing {}", path.display()))?;
    set_mode(&path, a.mode)?;
    Ok(path)
}

/// Restore a file, or every file below a directory.
pub fn restore_assets(dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
    if find(name).is_some() {
        return Ok(vec![restore_asset(dir, name)?]);
    }
    let base = canonical(name);
    let mut out = Vec::new();
    for child in asset_dir(&base)? {
        let sub = if base.is_empty() { child } else { format!("{}/{}", base, child) };
        out.extend(restore_assets(dir, &sub)?);
    }
    Ok(out)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).with_context(|| format!("chmod {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
