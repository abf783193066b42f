use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use rollwave_core::{version::matching_versions, ConfigMapRef, RolloutStatus};
use rollwave_kubehub::Cluster;
use rollwave_manifest::{ExportSummary, ManifestPipeline, ManifestSelector, PolicyQuery, ValidatorConfig};
use rollwave_ops::{CommandExecutor, PrepArgs, PrepRunner, PrepStage};
use rollwave_rollout::{export_oadp_to_dir, export_restores_to_dir, WaveReconciler, WorkloadKind};
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "rollwavectl", version, about = "Wave-ordered backup/restore rollout and manifest export")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Expand a target version into the labels it matches
    Versions { version: String },
    /// Run one backup pass (or keep going with --watch)
    Backup {
        /// ConfigMap holding Backup objects, as namespace/name (repeatable)
        #[arg(long = "configmap", env = "ROLLWAVE_CONFIGMAPS", value_delimiter = ',')]
        configmaps: Vec<ConfigMapRef>,
        #[arg(long = "watch", action = ArgAction::SetTrue)]
        watch: bool,
    },
    /// Run one restore pass (or keep going with --watch)
    Restore {
        #[arg(long = "configmap", env = "ROLLWAVE_CONFIGMAPS", value_delimiter = ',')]
        configmaps: Vec<ConfigMapRef>,
        #[arg(long = "watch", action = ArgAction::SetTrue)]
        watch: bool,
    },
    /// Validate and export extra manifests from ConfigMaps
    ExportManifests {
        #[arg(long = "configmap", value_delimiter = ',', required = true)]
        configmaps: Vec<ConfigMapRef>,
        #[arg(long = "dir")]
        dir: PathBuf,
        #[command(flatten)]
        select: SelectArgs,
    },
    /// Validate extra manifests without writing anything
    ValidateManifests {
        #[arg(long = "configmap", value_delimiter = ',', required = true)]
        configmaps: Vec<ConfigMapRef>,
    },
    /// Extract, validate and export manifests embedded in policies
    ExportPolicies {
        #[arg(long = "dir")]
        dir: PathBuf,
        /// Namespace to list policies in (default: all)
        #[arg(long = "policy-ns")]
        namespace: Option<String>,
        /// Equality label selector for policies, e.g. "env=prod"
        #[arg(long = "selector")]
        selector: Option<String>,
        #[command(flatten)]
        select: SelectArgs,
    },
    /// Write Restore objects to <dir>/restores/restore<N>/
    ExportRestores {
        #[arg(long = "configmap", value_delimiter = ',', required = true)]
        configmaps: Vec<ConfigMapRef>,
        #[arg(long = "dir")]
        dir: PathBuf,
    },
    /// Write DataProtectionApplications and their storage secrets to <dir>/oadp/
    ExportOadp {
        #[arg(long = "oadp-ns", default_value = "openshift-adp")]
        namespace: String,
        #[arg(long = "dir")]
        dir: PathBuf,
    },
    /// List or extract the embedded scripts
    Assets {
        /// Extract every asset under this directory
        #[arg(long = "extract")]
        extract: Option<PathBuf>,
    },
    /// Run or inspect a host prep stage
    Prep {
        /// seed-image-pull | precache | stateroot | cleanup
        stage: String,
        #[arg(long = "work-dir", env = "ROLLWAVE_PREP_DIR", default_value = "/var/tmp/rollwave")]
        work_dir: PathBuf,
        #[arg(long = "seed-image", default_value = "")]
        seed_image: String,
        #[arg(long = "os-version")]
        os_version: Option<String>,
        #[arg(long = "os-name")]
        os_name: Option<String>,
        /// Only read the progress file
        #[arg(long = "status", action = ArgAction::SetTrue)]
        status: bool,
        #[arg(long = "verbose", action = ArgAction::SetTrue)]
        verbose: bool,
    },
}

#[derive(clap::Args, Debug)]
struct SelectArgs {
    /// Keep only manifests labelled for this version
    #[arg(long = "target-version")]
    target_version: Option<String>,
    /// Fail unless exactly this many manifests are selected
    #[arg(long = "expected-count")]
    expected_count: Option<usize>,
}

impl SelectArgs {
    fn selector(&self) -> Result<ManifestSelector> {
        Ok(ManifestSelector::for_version(self.target_version.as_deref())?.expect_count(self.expected_count))
    }
}

fn init_tracing() {
    let env = std::env::var("ROLLWAVE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("ROLLWAVE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid ROLLWAVE_METRICS_ADDR; expected host:port");
        }
    }
}

fn emit<T: Serialize>(output: Output, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    match output {
        Output::Human => human(value),
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn print_status(output: Output, status: &RolloutStatus) -> Result<()> {
    emit(output, status, |s| match s.requeue_after {
        Some(d) => println!("{} • {} • requeue in {}s", s.phase, s.message, d.as_secs()),
        None => println!("{} • {}", s.phase, s.message),
    })
}

fn print_export(output: Output, summary: &ExportSummary) -> Result<()> {
    emit(output, summary, |s| {
        for f in &s.files {
            println!("{}", f.display());
        }
        for w in &s.warnings {
            println!("warning: {}", w);
        }
    })
}

/// Stand-in for an external scheduler: re-run passes until one is terminal.
async fn drive(kind: WorkloadKind, refs: &[ConfigMapRef], watch: bool, output: Output, cancel: &CancellationToken) -> Result<()> {
    let reconciler = WaveReconciler::new(Cluster::connect().await?);
    loop {
        let status = reconciler.reconcile_workload(kind, refs, cancel).await?;
        print_status(output, &status)?;
        let Some(delay) = status.requeue_after.filter(|_| watch) else { return Ok(()) };
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                info!("interrupt received; cancelling");
                cancel.cancel();
            }
        }
    });

    match cli.command {
        Commands::Versions { version } => {
            let labels = matching_versions(&version)?;
            emit(cli.output, &labels, |l| println!("{}", l.join("\n")))?;
        }
        Commands::Backup { configmaps, watch } => drive(WorkloadKind::Backup, &configmaps, watch, cli.output, &cancel).await?,
        Commands::Restore { configmaps, watch } => drive(WorkloadKind::Restore, &configmaps, watch, cli.output, &cancel).await?,
        Commands::ExportManifests { configmaps, dir, select } => {
            let pipeline = ManifestPipeline::new(Cluster::connect().await?, ValidatorConfig::from_env());
            let summary = pipeline.export_extra_manifests(&configmaps, &select.selector()?, &dir, &cancel).await?;
            print_export(cli.output, &summary)?;
        }
        Commands::ValidateManifests { configmaps } => {
            let pipeline = ManifestPipeline::new(Cluster::connect().await?, ValidatorConfig::from_env());
            let report = pipeline.validate_extra_manifests(&configmaps, &cancel).await?;
            emit(cli.output, &report, |r| match r.warning_text() {
                Some(w) => println!("valid with warnings: {}", w),
                None => println!("valid"),
            })?;
        }
        Commands::ExportPolicies { dir, namespace, selector, select } => {
            let pipeline = ManifestPipeline::new(Cluster::connect().await?, ValidatorConfig::from_env());
            let query = PolicyQuery { namespace, selector, ..PolicyQuery::default() };
            let summary = pipeline.export_policy_manifests(&query, &select.selector()?, &dir, &cancel).await?;
            print_export(cli.output, &summary)?;
        }
        Commands::ExportRestores { configmaps, dir } => {
            let cluster = Cluster::connect().await?;
            let ns = export_restores_to_dir(cluster.store.as_ref(), &configmaps, &dir, &cancel).await?;
            emit(cli.output, &ns, |ns| println!("restores exported; namespace {}", ns))?;
        }
        Commands::ExportOadp { namespace, dir } => {
            let cluster = Cluster::connect().await?;
            let export = export_oadp_to_dir(cluster.store.as_ref(), &namespace, &dir, &cancel).await?;
            emit(cli.output, &export, |e| e.dpas.iter().chain(&e.secrets).for_each(|p| println!("{}", p.display())))?;
        }
        Commands::Assets { extract } => match extract {
            Some(dir) => {
                let written = rollwave_ops::restore_assets(&dir, "")?;
                emit(cli.output, &written, |w| w.iter().for_each(|p| println!("{}", p.display())))?;
            }
            None => emit(cli.output, &rollwave_ops::asset_names(), |n| println!("{}", n.join("\n")))?,
        },
        Commands::Prep { stage, work_dir, seed_image, os_version, os_name, status, verbose } => {
            let stage: PrepStage = stage.parse()?;
            let runner = PrepRunner::new(CommandExecutor::new(verbose), work_dir);
            if status {
                let st = runner.status(stage).await?;
                emit(cli.output, &st, |s| println!("{} • {:?}", stage, s))?;
            } else {
                let args = PrepArgs { seed_image, os_version, os_name };
                let report = runner.run_stage(stage, &args).await?;
                emit(cli.output, &report, |r| println!("{} • {:?}", r.stage, r.status))?;
            }
        }
    }
    Ok(())
}
