//! Rollwave ops: host-level prep stages run as embedded shell scripts.
//!
//! The scripts are opaque to the engine. They are launched through an
//! [`Executor`] and report progress by overwriting a single-line progress file.

#![forbid(unsafe_code)]

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

pub mod assets;
mod prep;
mod progress;

pub use assets::{asset, asset_dir, asset_names, restore_asset, restore_assets};
pub use prep::{PrepArgs, PrepRunner, StageReport};
pub use progress::{parse_progress, read_progress, PrepStage, StageStatus};

/// A command that ran but did not exit cleanly.
#[derive(Debug, thiserror::Error)]
#[error("{command} exited with {code:?}: {stderr}")]
pub struct ExecError {
    pub command: String,
    pub code: Option<i32>,
    pub stderr: String,
}

/// Runs external commands and captures their trimmed stdout.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, command: &str, args: &[String]) -> Result<String>;
}

/// Default implementation on `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    pub verbose: bool,
}

impl CommandExecutor {
    pub fn new(verbose: bool) -> Self { Self { verbose } }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn execute(&self, command: &str, args: &[String]) -> Result<String> {
        info!(command = %command, args = ?args, "executing");
        let out = Command::new(command).args(args).output().await?;
        let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if self.verbose && !stdout.is_empty() {
            debug!(command = %command, "{}", stdout);
        }
        if !out.status.success() {
            return Err(ExecError {
                command: command.to_string(),
                code: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_reports_exit_codes() {
        let ex = CommandExecutor::new(false);
        let out = ex.execute("sh", &["-c".into(), "echo ' hi '".into()]).await.unwrap();
        assert_eq!(out, "hi");
        let err = ex.execute("sh", &["-c".into(), "echo oops >&2; exit 3".into()]).await.unwrap_err();
        let exec = err.downcast_ref::<ExecError>().unwrap();
        assert_eq!(exec.code, Some(3));
        assert_eq!(exec.stderr, "oops");
    }
}
