use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Host-level prep stages, each backed by one embedded script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrepStage {
    PullSeed,
    Precache,
    Stateroot,
    Cleanup,
}

impl PrepStage {
    pub const ALL: [PrepStage; 4] = [PrepStage::PullSeed, PrepStage::Precache, PrepStage::Stateroot, PrepStage::Cleanup];

    pub fn script(&self) -> &'static str {
        match self {
            PrepStage::PullSeed => "prep/prep-pull-seed.sh",
            PrepStage::Precache => "prep/prep-precache.sh",
            PrepStage::Stateroot => "prep/prep-stateroot.sh",
            PrepStage::Cleanup => "prep/prep-cleanup.sh",
        }
    }

    /// Suffix of the `started-` / `completed-` markers the script writes.
    pub fn marker(&self) -> &'static str {
        match self {
            PrepStage::PullSeed => "seed-image-pull",
            PrepStage::Precache => "precache",
            PrepStage::Stateroot => "stateroot",
            PrepStage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for PrepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

impl std::str::FromStr for PrepStage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        PrepStage::ALL
            .into_iter()
            .find(|st| st.marker() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown prep stage {:?}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    Unknown,
}

pub fn parse_progress(stage: PrepStage, content: &str) -> StageStatus {
    let line = content.trim();
    if line == "Failed" {
        return StageStatus::Failed;
    }
    match line.split_once('-') {
        Some(("started", m)) if m == stage.marker() => StageStatus::Running,
        Some(("completed", m)) if m == stage.marker() => StageStatus::Completed,
        _ => StageStatus::Unknown,
    }
}

/// A missing progress file means the stage never started.
pub async fn read_progress(stage: PrepStage, path: &Path) -> Result<StageStatus> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(parse_progress(stage, &content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StageStatus::NotStarted),
        Err(e) => Err(e).with_context(|| format!("reading progress file {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_classify_for_their_stage_only() {
        assert_eq!(parse_progress(PrepStage::PullSeed, "started-seed-image-pull\n"), StageStatus::Running);
        assert_eq!(parse_progress(PrepStage::PullSeed, "completed-seed-image-pull"), StageStatus::Completed);
        assert_eq!(parse_progress(PrepStage::Precache, "completed-seed-image-pull"), StageStatus::Unknown);
        assert_eq!(parse_progress(PrepStage::Stateroot, "Failed"), StageStatus::Failed);
        assert_eq!(parse_progress(PrepStage::Cleanup, ""), StageStatus::Unknown);
    }

    #[test]
    fn stage_names_parse() {
        assert_eq!("precache".parse::<PrepStage>().unwrap(), PrepStage::Precache);
        assert!("deploy".parse::<PrepStage>().is_err());
    }

    #[tokio::test]
    async fn missing_file_is_not_started() {
        let p = std::env::temp_dir().join("rollwave-progress-does-not-exist");
        assert_eq!(read_progress(PrepStage::Precache, &p).await.unwrap(), StageStatus::NotStarted);
    }
}
