use std::path::{Path, PathBuf};

use anyhow::Result;
use metrics::counter;
use rollwave_core::Error;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{read_progress, restore_assets, ExecError, Executor, PrepStage, StageStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepArgs {
    pub seed_image: String,
    pub os_version: Option<String>,
    pub os_name: Option<String>,
}

impl PrepArgs {
    /// Command-line arguments for `stage`'s script.
    pub fn to_args(&self, stage: PrepStage, progress_file: &Path) -> Result<Vec<String>> {
        if self.seed_image.is_empty() {
            return Err(Error::MissingField { what: format!("{} stage", stage), field: "seed image" }.into());
        }
        let mut args = vec![
            "--seed-image".to_string(),
            self.seed_image.clone(),
            "--progress-file".to_string(),
            progress_file.display().to_string(),
        ];
        if stage == PrepStage::Stateroot {
            let version = self.os_version.clone().ok_or_else(|| Error::MissingField { what: "stateroot stage".into(), field: "os version" })?;
            let name = self.os_name.clone().ok_or_else(|| Error::MissingField { what: "stateroot stage".into(), field: "os name" })?;
            args.extend(["--os-version".to_string(), version, "--os-name".to_string(), name]);
        }
        Ok(args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: PrepStage,
    pub status: StageStatus,
    pub output: String,
}

/// Extracts the scripts into a work directory and runs stages there.
pub struct PrepRunner<E: Executor> {
    executor: E,
    work_dir: PathBuf,
}

impl<E: Executor> PrepRunner<E> {
    pub fn new(executor: E, work_dir: impl Into<PathBuf>) -> Self {
        Self { executor, work_dir: work_dir.into() }
    }

    pub fn progress_file(&self, stage: PrepStage) -> PathBuf {
        self.work_dir.join(format!("{}.progress", stage))
    }

    pub async fn status(&self, stage: PrepStage) -> Result<StageStatus> {
        read_progress(stage, &self.progress_file(stage)).await
    }

    /// Run one stage to completion. A non-zero exit is `Failed` whatever the
    /// progress file says; other launch errors propagate.
    pub async fn run_stage(&self, stage: PrepStage, args: &PrepArgs) -> Result<StageReport> {
        restore_assets(&self.work_dir, "prep")?;
        let script = self.work_dir.join(stage.script());
        let mut cmd_args = vec![script.display().to_string()];
        cmd_args.extend(args.to_args(stage, &self.progress_file(stage))?);
        counter!("prep_stage_total", 1u64, "stage" => stage.marker());

        match self.executor.execute("/bin/bash", &cmd_args).await {
            Ok(output) => {
                let status = self.status(stage).await?;
                info!(stage = %stage, status = ?status, "prep stage finished");
                Ok(StageReport { stage, status, output })
            }
            Err(e) => match e.downcast::<ExecError>() {
                Ok(exec) => {
                    warn!(stage = %stage, code = ?exec.code, stderr = %exec.stderr, "prep stage failed");
                    Ok(StageReport { stage, status: StageStatus::Failed, output: exec.stderr })
                }
                Err(other) => Err(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Writes a fixed progress line, then succeeds or fails.
    struct FakeExecutor {
        progress: &'static str,
        exit: Option<i32>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl Executor for FakeExecutor {
        async fn execute(&self, command: &str, args: &[String]) -> Result<String> {
            self.calls.lock().unwrap().push(args.to_vec());
            let pos = args.iter().position(|a| a == "--progress-file").unwrap();
            std::fs::write(&args[pos + 1], self.progress).unwrap();
            match self.exit {
                None => Ok("done".into()),
                Some(code) => Err(ExecError { command: command.into(), code: Some(code), stderr: "boom".into() }.into()),
            }
        }
    }

    fn work_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "rollwave-prep-{}-{}",
            tag,
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
        ))
    }

    fn seed() -> PrepArgs {
        PrepArgs { seed_image: "quay.io/seed:1".into(), ..Default::default() }
    }

    #[tokio::test]
    async fn successful_stage_reads_progress_file() {
        let dir = work_dir("ok");
        let ex = FakeExecutor { progress: "completed-precache", exit: None, calls: Mutex::new(vec![]) };
        let runner = PrepRunner::new(ex, &dir);
        assert_eq!(runner.status(PrepStage::Precache).await.unwrap(), StageStatus::NotStarted);
        let report = runner.run_stage(PrepStage::Precache, &seed()).await.unwrap();
        assert_eq!(report.status, StageStatus::Completed);
        assert_eq!(report.output, "done");
        let calls = runner.executor.calls.lock().unwrap().clone();
        assert!(calls[0][0].ends_with("prep/prep-precache.sh"));
        assert_eq!(calls[0][1..3], ["--seed-image".to_string(), "quay.io/seed:1".to_string()]);
        assert!(dir.join("prep/common.sh").is_file());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn non_zero_exit_wins_over_progress_file() {
        let dir = work_dir("fail");
        let ex = FakeExecutor { progress: "completed-seed-image-pull", exit: Some(1), calls: Mutex::new(vec![]) };
        let report = PrepRunner::new(ex, &dir).run_stage(PrepStage::PullSeed, &seed()).await.unwrap();
        assert_eq!(report.status, StageStatus::Failed);
        assert_eq!(report.output, "boom");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stateroot_requires_os_fields() {
        let p = Path::new("/tmp/p");
        assert!(seed().to_args(PrepStage::Stateroot, p).is_err());
        let full = PrepArgs { os_version: Some("417".into()), os_name: Some("rhcos_4.17".into()), ..seed() };
        let args = full.to_args(PrepStage::Stateroot, p).unwrap();
        assert_eq!(&args[4..], ["--os-version", "417", "--os-name", "rhcos_4.17"]);
        assert!(PrepArgs::default().to_args(PrepStage::Cleanup, p).is_err());
    }
}
