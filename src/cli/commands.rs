use crate::core::{BuildDriver, RunReport, TargetDescriptor};
use crate::infrastructure::TokioFileSystemService;
use crate::utils::config_loader::CONFIG_FILE;
use crate::utils::{CliOverrides, ConfigLoader, Logger};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "tandem - build one source tree for node and the browser")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build every configured target
    Build {
        #[command(flatten)]
        config: ConfigArg,
        /// Only build this target (repeatable)
        #[arg(short, long = "target")]
        targets: Vec<String>,
        /// Log warnings instead of failing the target
        #[arg(long)]
        advisory_warnings: bool,
        /// Build targets one after another
        #[arg(long)]
        sequential: bool,
        /// Keep building the remaining targets after a failure
        #[arg(long)]
        best_effort: bool,
    },
    /// Validate the configuration without building
    Check {
        #[command(flatten)]
        config: ConfigArg,
    },
}

#[derive(Args)]
pub struct ConfigArg {
    /// Configuration file
    #[arg(short, long, default_value = CONFIG_FILE)]
    pub config: PathBuf,
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    /// Returns the process exit status
    pub async fn run(&self) -> anyhow::Result<i32> {
        Logger::init("tandem=info");

        let cli = Cli::parse();

        match cli.command {
            Commands::Build {
                config,
                targets,
                advisory_warnings,
                sequential,
                best_effort,
            } => {
                let overrides = CliOverrides {
                    targets,
                    advisory_warnings,
                    sequential,
                    best_effort,
                };
                self.handle_build_command(&config.config, &overrides).await
            }
            Commands::Check { config } => self.handle_check_command(&config.config),
        }
    }

    async fn handle_build_command(&self, path: &Path, overrides: &CliOverrides) -> anyhow::Result<i32> {
        let config = ConfigLoader::load(path).with_context(|| format!("loading {}", path.display()))?;
        let config = ConfigLoader::apply_overrides(config, overrides)?;

        let driver = BuildDriver::new(Arc::new(TokioFileSystemService))
            .with_schedule(config.schedule, config.failure_mode);
        let report = driver.run(&config).await.context("invalid configuration")?;

        self.print_failures(&report);
        Ok(report.exit_code())
    }

    fn handle_check_command(&self, path: &Path) -> anyhow::Result<i32> {
        let config = ConfigLoader::load(path).with_context(|| format!("loading {}", path.display()))?;
        let descriptors = TargetDescriptor::all(&config).context("invalid configuration")?;

        for descriptor in &descriptors {
            let stages: Vec<&str> = descriptor.stages.iter().map(|s| s.name()).collect();
            Logger::info(&format!(
                "✅ {} ({}): {} entries, stages [{}], {} outputs",
                descriptor.name,
                descriptor.platform,
                descriptor.input.len(),
                stages.join(", "),
                descriptor.outputs.len()
            ));
        }
        Ok(0)
    }

    fn print_failures(&self, report: &RunReport) {
        for target in report.failed() {
            if let Some(error) = &target.error {
                eprintln!("{}", error);
            }
        }
    }
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}
