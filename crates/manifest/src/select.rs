use rollwave_core::{version::matching_versions, Error, Result, TARGET_VERSION_LABEL};

use crate::Manifest;

/// Keeps manifests whose target-version label matches the requested version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestSelector {
    candidates: Option<Vec<String>>,
    expected: Option<usize>,
}

impl ManifestSelector {
    /// No version selects everything.
    pub fn for_version(version: Option<&str>) -> Result<Self> {
        let candidates = version.map(matching_versions).transpose()?;
        Ok(Self { candidates, expected: None })
    }

    pub fn expect_count(mut self, expected: Option<usize>) -> Self {
        self.expected = expected;
        self
    }

    pub fn candidates(&self) -> Option<&[String]> {
        self.candidates.as_deref()
    }

    /// The manifest's own label decides; without one, its enclosing group's does.
    pub fn matches(&self, manifest: &Manifest) -> bool {
        let Some(candidates) = &self.candidates else { return true };
        let label = manifest
            .label(TARGET_VERSION_LABEL)
            .or_else(|| manifest.group.as_ref().and_then(|g| g.labels.get(TARGET_VERSION_LABEL)).map(|s| s.as_str()));
        match label {
            Some(values) => values.split(',').map(str::trim).any(|v| candidates.iter().any(|c| c == v)),
            None => false,
        }
    }

    pub fn select(&self, manifests: Vec<Manifest>) -> Result<Vec<Manifest>> {
        let selected: Vec<Manifest> = manifests.into_iter().filter(|m| self.matches(m)).collect();
        match self.expected {
            Some(expected) if expected != selected.len() => {
                Err(Error::CountMismatch { expected, actual: selected.len() })
            }
            _ => Ok(selected),
        }
    }
}
