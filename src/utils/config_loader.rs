use crate::core::models::{BuildConfig, FailureMode, Schedule, WarningPolicy};
use crate::utils::{BuildError, Logger, Result};
use std::path::{Path, PathBuf};

/// Configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "tandem.config.json";

/// Command line switches applied on top of the configuration file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Only build these targets; empty means all
    pub targets: Vec<String>,
    pub advisory_warnings: bool,
    pub sequential: bool,
    pub best_effort: bool,
}

/// Config loader that supports config files with CLI override
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a configuration file. A relative `project_root` is taken
    /// relative to the directory holding the file.
    pub fn load(path: &Path) -> Result<BuildConfig> {
        Logger::debug(&format!("Loading config from {}", path.display()));

        let content = std::fs::read_to_string(path).map_err(|e| {
            BuildError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse(&content, &base_dir)
    }

    /// Searches for tandem.config.json in `root`
    pub fn load_from_dir(root: &Path) -> Result<Option<BuildConfig>> {
        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            Logger::debug(&format!("No {} found in {}", CONFIG_FILE, root.display()));
            return Ok(None);
        }
        Self::load(&config_path).map(Some)
    }

    pub fn parse(content: &str, base_dir: &Path) -> Result<BuildConfig> {
        let mut config: BuildConfig = serde_json::from_str(content)
            .map_err(|e| BuildError::config(format!("Failed to parse {}: {}", CONFIG_FILE, e)))?;
        if config.project_root.is_relative() {
            config.project_root = join_clean(base_dir, &config.project_root);
        }
        Ok(config)
    }

    /// CLI switches win over the file
    pub fn apply_overrides(mut config: BuildConfig, overrides: &CliOverrides) -> Result<BuildConfig> {
        if !overrides.targets.is_empty() {
            if let Some(unknown) = overrides
                .targets
                .iter()
                .find(|name| !config.targets.iter().any(|t| &t.name == *name))
            {
                return Err(BuildError::config(format!("unknown target '{}'", unknown)));
            }
            config.targets.retain(|t| overrides.targets.contains(&t.name));
        }

        if overrides.advisory_warnings {
            config.base.warning_policy = Some(WarningPolicy::Advisory);
            for target in config.targets.iter_mut() {
                target.options.warning_policy = Some(WarningPolicy::Advisory);
            }
        }
        if overrides.sequential {
            config.schedule = Schedule::Sequential;
        }
        if overrides.best_effort {
            config.failure_mode = FailureMode::BestEffort;
        }
        Ok(config)
    }
}

fn join_clean(base: &Path, relative: &Path) -> PathBuf {
    if relative == Path::new(".") {
        base.to_path_buf()
    } else {
        base.join(relative)
    }
}
