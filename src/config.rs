use crate::log_debug;
use crate::sequencer::{EmptyStepPolicy, FailurePolicy, RunOptions};

use anyhow::{Context, Result, anyhow};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Project configuration filename, looked up at the repository root
pub const PROJECT_CONFIG_FILENAME: &str = ".chronicle.toml";

/// Configuration structure for git-chronicle
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    /// How runs behave
    #[serde(default)]
    pub run: RunConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Run behavior settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// What to do with a step that stages nothing
    #[serde(default)]
    pub on_empty_step: EmptyStepPolicy,
    /// What to do with created commits when a run fails
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Whether git runs its commit hooks
    #[serde(default = "default_verify")]
    pub verify: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            on_empty_step: EmptyStepPolicy::default(),
            on_failure: FailurePolicy::default(),
            verify: default_verify(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Whether to include logs from dependencies
    #[serde(default)]
    pub verbose: bool,
}

fn default_verify() -> bool {
    true
}

/// Project-level overrides. Only keys present in the file take effect.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct ProjectConfig {
    #[serde(default)]
    run: ProjectRunConfig,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct ProjectRunConfig {
    on_empty_step: Option<EmptyStepPolicy>,
    on_failure: Option<FailurePolicy>,
    verify: Option<bool>,
}

impl Config {
    /// Load the personal configuration, then merge the project file found at
    /// `project_root`.
    pub fn load(project_root: Option<&Path>) -> Result<Self> {
        let user_path = Self::get_config_path()?;
        Self::load_from(Some(&user_path), project_root)
    }

    /// Load from explicit locations. Missing files fall back to defaults.
    pub fn load_from(user_path: Option<&Path>, project_root: Option<&Path>) -> Result<Self> {
        let mut config = match user_path {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Invalid configuration file {}", path.display()))?
            }
            _ => Self::default(),
        };

        if let Some(root) = project_root {
            let project_path = root.join(PROJECT_CONFIG_FILENAME);
            if project_path.exists() {
                config.merge_with_project_config(&project_path)?;
            }
        }

        log_debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Merge the project file at `path`, project values taking precedence
    fn merge_with_project_config(&mut self, path: &Path) -> Result<()> {
        log_debug!("Merging with project configuration {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read project config file {}", path.display()))?;
        let project: ProjectConfig = toml::from_str(&content).map_err(|e| {
            anyhow!(
                "Invalid project configuration file format: {}. Please check your {} file for syntax errors.",
                e,
                PROJECT_CONFIG_FILENAME
            )
        })?;

        if let Some(policy) = project.run.on_empty_step {
            self.run.on_empty_step = policy;
        }
        if let Some(policy) = project.run.on_failure {
            self.run.on_failure = policy;
        }
        if let Some(verify) = project.run.verify {
            self.run.verify = verify;
        }
        Ok(())
    }

    /// Get the path to the personal configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        let mut path =
            config_dir().ok_or_else(|| anyhow!("Unable to determine config directory"))?;
        path.push("git-chronicle");
        path.push("config.toml");
        Ok(path)
    }

    /// Sequencer options for this configuration
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            on_empty_step: self.run.on_empty_step,
            on_failure: self.run.on_failure,
        }
    }
}
