use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use rollwave_core::{group_into_waves, ConfigMapRef, Error};
use rollwave_kubehub::{get_config_maps, Cluster};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    decode_sources, extract_policy_manifests, sources_from_config_maps, ClusterReadinessValidator, Manifest,
    ManifestCategory, ManifestSelector, ManifestWriter, PolicyQuery, ValidationReport, ValidatorConfig,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub files: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Decode, select, validate and write manifests in one synchronous request.
pub struct ManifestPipeline {
    cluster: Cluster,
    validator: ClusterReadinessValidator,
}

impl ManifestPipeline {
    pub fn new(cluster: Cluster, config: ValidatorConfig) -> Self {
        let validator = ClusterReadinessValidator::new(cluster.clone(), config);
        Self { cluster, validator }
    }

    async fn read_config_maps(&self, refs: &[ConfigMapRef], cancel: &CancellationToken) -> Result<(Vec<Manifest>, Vec<String>)> {
        let cms = get_config_maps(self.cluster.store.as_ref(), refs, cancel)
            .await
            .context("reading extra-manifest configmaps")?;
        Ok(decode_sources(&sources_from_config_maps(&cms)))
    }

    /// Selection runs before validation, so a count mismatch wins over any
    /// decode error. Nothing is written unless validation passes.
    pub async fn export(
        &self,
        category: ManifestCategory,
        manifests: Vec<Manifest>,
        decode_errors: Vec<String>,
        selector: &ManifestSelector,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ExportSummary> {
        let t0 = Instant::now();
        counter!("manifest_export_total", 1u64, "category" => category.dir_name());
        let selected = selector.select(manifests)?;
        let waves = group_into_waves(selected)?;
        let report = self.validator.validate(&waves, decode_errors, cancel).await?;
        let files = ManifestWriter::new(dir).write(category, &waves)?;
        histogram!("manifest_export_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(category = category.dir_name(), waves = waves.len(), files = files.len(), "exported manifests");
        Ok(ExportSummary { files, warnings: report.warnings })
    }

    pub async fn export_extra_manifests(
        &self,
        refs: &[ConfigMapRef],
        selector: &ManifestSelector,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ExportSummary> {
        let (manifests, errors) = self.read_config_maps(refs, cancel).await?;
        self.export(ManifestCategory::ExtraManifests, manifests, errors, selector, dir, cancel).await
    }

    pub async fn export_policy_manifests(
        &self,
        query: &PolicyQuery,
        selector: &ManifestSelector,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ExportSummary> {
        let policies = query.list(self.cluster.store.as_ref(), cancel).await?;
        let (manifests, errors) = extract_policy_manifests(&policies);
        self.export(ManifestCategory::PolicyManifests, manifests, errors, selector, dir, cancel).await
    }

    /// Validate every manifest of the ConfigMaps without selecting or writing.
    pub async fn validate_extra_manifests(&self, refs: &[ConfigMapRef], cancel: &CancellationToken) -> Result<ValidationReport> {
        let (manifests, errors) = self.read_config_maps(refs, cancel).await?;
        let waves = group_into_waves(manifests)?;
        self.validator.validate(&waves, errors, cancel).await
    }
}

/// True when `err` is the batch of per-manifest problems rather than an I/O failure.
pub fn is_invalid_manifests(err: &anyhow::Error) -> bool {
    err.chain().any(|e| matches!(e.downcast_ref::<Error>(), Some(Error::InvalidManifests(_))))
}
