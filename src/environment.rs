//! Filesystem layout and host handles for one installer run.

use crate::agents::AgentDescriptor;
use crate::error::{InstallError, Result};
use crate::process::CommandRunner;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything a stage may touch on the host.
///
/// Layout under `root`:
///
/// ```text
/// image_builds/<agent>/   build context per agent
/// quadlets/               canonical unit definitions
/// secrets/                per-agent env files (mode 0600)
/// ```
///
/// The supervisor's discovery directory holds symlinks into `quadlets/`.
/// Directories are created on first use and never removed.
pub struct TargetEnvironment {
    root: PathBuf,
    bundle: PathBuf,
    discovery_dir: PathBuf,
    socket_candidates: Vec<PathBuf>,
    runner: Box<dyn CommandRunner>,
}

impl TargetEnvironment {
    pub fn new(
        root: PathBuf,
        bundle: PathBuf,
        discovery_dir: PathBuf,
        socket_candidates: Vec<PathBuf>,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        Self {
            root,
            bundle,
            discovery_dir,
            socket_candidates,
            runner,
        }
    }

    /// Environment for the invoking user, derived from `HOME`,
    /// `XDG_CONFIG_HOME`, `XDG_RUNTIME_DIR` and the numeric uid.
    pub fn for_current_user(
        root: PathBuf,
        bundle: PathBuf,
        runner: Box<dyn CommandRunner>,
    ) -> Result<Self> {
        let home = crate::config::home_dir().ok_or_else(|| {
            InstallError::InvalidConfig("HOME is not set".to_string())
        })?;
        let config_home = std::env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".config"));
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let uid = crate::utils::path::current_uid();

        Ok(Self::new(
            root,
            bundle,
            config_home.join("containers").join("systemd"),
            socket_candidates(runtime_dir.as_deref(), uid),
            runner,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bundle(&self) -> &Path {
        &self.bundle
    }

    pub fn discovery_dir(&self) -> &Path {
        &self.discovery_dir
    }

    pub fn socket_candidates(&self) -> &[PathBuf] {
        &self.socket_candidates
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn build_context_dir(&self, agent: &AgentDescriptor) -> PathBuf {
        self.root.join("image_builds").join(agent.name)
    }

    pub fn units_dir(&self) -> PathBuf {
        self.root.join("quadlets")
    }

    pub fn secrets_dir(&self) -> PathBuf {
        self.root.join("secrets")
    }

    /// Destination env file, `None` for agents without configuration.
    pub fn env_file(&self, agent: &AgentDescriptor) -> Option<PathBuf> {
        agent.env_file.map(|name| self.secrets_dir().join(name))
    }

    pub fn bundle_source(&self, agent: &AgentDescriptor, file: &str) -> PathBuf {
        self.bundle.join("image_builds").join(agent.name).join(file)
    }

    pub fn bundle_unit(&self, unit: &str) -> PathBuf {
        self.bundle.join("quadlets").join(unit)
    }

    /// Packaged env template, `None` for agents without configuration.
    pub fn bundle_template(&self, agent: &AgentDescriptor) -> Option<PathBuf> {
        agent
            .env_file
            .map(|name| self.bundle.join("templates").join(name))
    }

    /// Create a directory (and parents) if it does not exist yet.
    pub fn ensure_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| InstallError::fs(dir, e))
    }
}

/// Control socket locations in probe order: the user runtime directory,
/// the conventional per-uid path, then the system-wide socket.
pub fn socket_candidates(runtime_dir: Option<&Path>, uid: u32) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = runtime_dir {
        candidates.push(dir.join("podman").join("podman.sock"));
    }
    let per_uid = PathBuf::from(format!("/run/user/{}/podman/podman.sock", uid));
    if !candidates.contains(&per_uid) {
        candidates.push(per_uid);
    }
    candidates.push(PathBuf::from("/run/podman/podman.sock"));
    candidates
}
