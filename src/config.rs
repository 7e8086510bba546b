use crate::agents::{registry, FailurePolicy};
use crate::error::{InstallError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Installer settings. Operator secrets and agent values are never stored
/// here; those live in the per-agent env files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Target root holding image_builds/, quadlets/ and secrets/
    #[serde(default)]
    pub root: Option<String>,

    /// Packaged sources shipped with the installer
    #[serde(default)]
    pub bundle: Option<String>,

    /// Agents to install, by name
    #[serde(default)]
    pub agents: Vec<String>,

    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Minimum python3 version required by the agent payloads
    #[serde(default = "default_min_python")]
    pub min_python: String,

    /// Upper bound for every child process, 0 waits forever
    #[serde(default)]
    pub command_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            min_python: default_min_python(),
            command_timeout_secs: 0,
        }
    }
}

fn default_min_python() -> String {
    "3.11.0".to_string()
}

/// What happens when the operator picks a value outside an allowed set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvalidChoice {
    /// End the run
    #[default]
    Abort,
    /// Ask again
    Reprompt,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyConfig {
    #[serde(default)]
    pub invalid_choice: InvalidChoice,

    /// Per-agent override of the declared build failure policy
    #[serde(default)]
    pub build: BTreeMap<String, FailurePolicy>,
}

impl Config {
    /// Load configuration with precedence:
    /// 1. Environment variables
    /// 2. Global config (~/.satellite-install.toml)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = home_dir() {
            let global_config = home.join(".satellite-install.toml");
            if global_config.exists() {
                config = config.merge(Self::from_file(&global_config)?);
            }
        }

        config = config.merge_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| InstallError::fs(path, e))?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(mut self, other: Self) -> Self {
        if other.root.is_some() {
            self.root = other.root;
        }
        if other.bundle.is_some() {
            self.bundle = other.bundle;
        }
        if !other.agents.is_empty() {
            self.agents = other.agents;
        }
        if other.host.min_python != default_min_python() {
            self.host.min_python = other.host.min_python;
        }
        if other.host.command_timeout_secs != 0 {
            self.host.command_timeout_secs = other.host.command_timeout_secs;
        }
        if other.policy.invalid_choice != InvalidChoice::default() {
            self.policy.invalid_choice = other.policy.invalid_choice;
        }
        self.policy.build.extend(other.policy.build);

        self
    }

    /// Apply environment variable overrides
    fn merge_env(mut self) -> Self {
        if let Ok(root) = std::env::var("SATELLITE_ROOT") {
            if !root.is_empty() {
                self.root = Some(root);
            }
        }

        if let Ok(bundle) = std::env::var("SATELLITE_BUNDLE") {
            if !bundle.is_empty() {
                self.bundle = Some(bundle);
            }
        }

        if let Ok(agents) = std::env::var("SATELLITE_AGENTS") {
            let names: Vec<String> = agents
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !names.is_empty() {
                self.agents = names;
            }
        }

        self
    }

    fn validate(&self) -> Result<()> {
        semver::Version::parse(&self.host.min_python).map_err(|e| {
            InstallError::InvalidConfig(format!(
                "host.min_python '{}' is not a valid version: {}",
                self.host.min_python, e
            ))
        })?;

        for name in self.policy.build.keys() {
            if registry::get(name).is_none() {
                return Err(InstallError::InvalidConfig(format!(
                    "policy.build names unknown agent '{}'",
                    name
                )));
            }
        }

        registry::select(&self.agent_names())?;
        Ok(())
    }

    /// Selected agent names, all agents when none are configured.
    pub fn agent_names(&self) -> Vec<String> {
        if self.agents.is_empty() {
            registry::list_available()
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            self.agents.clone()
        }
    }

    pub fn root_dir(&self) -> Option<PathBuf> {
        match &self.root {
            Some(root) => expand(root),
            None => home_dir().map(|h| h.join("satellite-agents")),
        }
    }

    pub fn bundle_dir(&self) -> Result<PathBuf> {
        match &self.bundle {
            Some(bundle) => expand(bundle).ok_or_else(|| {
                InstallError::InvalidConfig(format!("Cannot expand bundle path '{}'", bundle))
            }),
            None => Ok(std::env::current_dir()?.join("bundle")),
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        match self.host.command_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn expand(path: &str) -> Option<PathBuf> {
    crate::utils::path::expand_tilde(path)
}

pub(crate) fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}
