//! Host checks run before anything is written.
//!
//! Checks run in a fixed order and stop at the first failure. The only
//! side effect is creating the supervisor discovery directory.

use crate::agents::{registry, AgentDescriptor, BuildStyle};
use crate::environment::TargetEnvironment;
use crate::error::{InstallError, Result};
use crate::process::Invocation;
use semver::Version;
use std::fs::File;
use std::path::{Path, PathBuf};

pub const CONTAINER_TOOL: &str = "podman";
pub const SUPERVISOR_TOOL: &str = "systemctl";
pub const SCRIPT_RUNTIME: &str = "python3";
pub const SHELL: &str = "bash";

/// Host capabilities, in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    RootWritable,
    CommandsOnPath,
    ContainerRuntime,
    ScriptingRuntime,
    SupervisorSession,
    DiscoveryDir,
    SourceFiles,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::RootWritable,
        Capability::CommandsOnPath,
        Capability::ContainerRuntime,
        Capability::ScriptingRuntime,
        Capability::SupervisorSession,
        Capability::DiscoveryDir,
        Capability::SourceFiles,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::RootWritable => "root-writable",
            Capability::CommandsOnPath => "commands-on-path",
            Capability::ContainerRuntime => "container-runtime",
            Capability::ScriptingRuntime => "scripting-runtime",
            Capability::SupervisorSession => "supervisor-session",
            Capability::DiscoveryDir => "discovery-dir",
            Capability::SourceFiles => "source-files",
        }
    }
}

pub struct PreflightValidator<'a> {
    env: &'a TargetEnvironment,
    agents: &'a [&'static AgentDescriptor],
    min_python: Version,
}

impl<'a> PreflightValidator<'a> {
    pub fn new(
        env: &'a TargetEnvironment,
        agents: &'a [&'static AgentDescriptor],
        min_python: Version,
    ) -> Self {
        Self {
            env,
            agents,
            min_python,
        }
    }

    /// Run every check in order, stopping at the first failure.
    pub fn validate(&self) -> Result<()> {
        self.validate_only(&Capability::ALL)
    }

    /// Run the given checks in the given order, stopping at the first failure.
    pub fn validate_only(&self, checks: &[Capability]) -> Result<()> {
        for check in checks {
            tracing::debug!(check = check.name(), "checking");
            self.check(*check).map_err(|reason| InstallError::Validation {
                check: check.name(),
                reason,
            })?;
        }
        tracing::info!("host is ready ({} checks passed)", checks.len());
        Ok(())
    }

    fn check(&self, capability: Capability) -> std::result::Result<(), String> {
        match capability {
            Capability::RootWritable => self.check_root(),
            Capability::CommandsOnPath => self.check_commands(),
            Capability::ContainerRuntime => self.check_container_runtime(),
            Capability::ScriptingRuntime => self.check_scripting_runtime(),
            Capability::SupervisorSession => self.check_supervisor(),
            Capability::DiscoveryDir => self.check_discovery_dir(),
            Capability::SourceFiles => self.check_sources(),
        }
    }

    /// Programs the run will shell out to.
    pub fn required_commands(&self) -> Vec<&'static str> {
        let mut commands = vec![CONTAINER_TOOL, SUPERVISOR_TOOL, SCRIPT_RUNTIME];
        let needs_shell = self
            .agents
            .iter()
            .any(|a| matches!(a.build, Some(BuildStyle::Script { .. })));
        if needs_shell {
            commands.push(SHELL);
        }
        commands
    }

    /// Every packaged file the later stages copy, in copy order.
    pub fn required_sources(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for agent in self.agents {
            if let Some(template) = self.env.bundle_template(agent) {
                files.push(template);
            }
        }
        files.push(self.env.bundle_unit(registry::NETWORK_UNIT));
        for agent in self.agents {
            for unit in agent.units {
                files.push(self.env.bundle_unit(unit));
            }
            for file in agent.source_files {
                files.push(self.env.bundle_source(agent, file));
            }
        }
        files
    }

    fn check_root(&self) -> std::result::Result<(), String> {
        let root = self.env.root();
        if root.as_os_str().is_empty() {
            return Err("no installation root is set".to_string());
        }
        if root.exists() && !root.is_dir() {
            return Err(format!("{} exists and is not a directory", root.display()));
        }
        // The root itself is created later; probe the closest existing ancestor.
        let existing = root
            .ancestors()
            .find(|p| p.is_dir())
            .ok_or_else(|| format!("no existing parent directory for {}", root.display()))?;
        probe_writable(existing)
    }

    fn check_commands(&self) -> std::result::Result<(), String> {
        for program in self.required_commands() {
            if self.env.runner().resolve(program).is_none() {
                return Err(format!("'{}' was not found on PATH", program));
            }
        }
        Ok(())
    }

    fn check_container_runtime(&self) -> std::result::Result<(), String> {
        let output = self
            .env
            .runner()
            .run(&Invocation::new(
                CONTAINER_TOOL,
                &["info", "--format", "{{.Host.Security.Rootless}}"],
            ))
            .map_err(|e| e.to_string())?;
        if !output.success {
            return Err(format!(
                "'{} info' failed ({})",
                CONTAINER_TOOL,
                output.failure_reason()
            ));
        }
        match output.stdout.trim() {
            "true" => Ok(()),
            "false" => Err(format!(
                "{} is running rootful; run the installer as an unprivileged user",
                CONTAINER_TOOL
            )),
            other => Err(format!(
                "unexpected rootless status '{}' from '{} info'",
                other, CONTAINER_TOOL
            )),
        }
    }

    fn check_scripting_runtime(&self) -> std::result::Result<(), String> {
        let output = self
            .env
            .runner()
            .run(&Invocation::new(SCRIPT_RUNTIME, &["--version"]))
            .map_err(|e| e.to_string())?;
        if !output.success {
            return Err(format!("'{} --version' failed", SCRIPT_RUNTIME));
        }

        // Older interpreters print the version on stderr.
        let text = if output.stdout.trim().is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        let found = parse_runtime_version(text)
            .ok_or_else(|| format!("could not parse version from '{}'", text.trim()))?;

        if found < self.min_python {
            return Err(format!(
                "{} {} is older than the required {}",
                SCRIPT_RUNTIME, found, self.min_python
            ));
        }
        Ok(())
    }

    fn check_supervisor(&self) -> std::result::Result<(), String> {
        let output = self
            .env
            .runner()
            .run(&Invocation::new(
                SUPERVISOR_TOOL,
                &["--user", "show-environment"],
            ))
            .map_err(|e| e.to_string())?;
        if !output.success {
            return Err(format!(
                "the per-user systemd session is not reachable ({}). \
                 Log in through a real session or enable lingering",
                output.failure_reason()
            ));
        }
        Ok(())
    }

    fn check_discovery_dir(&self) -> std::result::Result<(), String> {
        let dir = self.env.discovery_dir();
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;
        probe_writable(dir)
    }

    fn check_sources(&self) -> std::result::Result<(), String> {
        for path in self.required_sources() {
            let file =
                File::open(&path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
            let is_file = file
                .metadata()
                .map(|m| m.is_file())
                .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
            if !is_file {
                return Err(format!("{} is not a regular file", path.display()));
            }
        }
        Ok(())
    }
}

fn probe_writable(dir: &Path) -> std::result::Result<(), String> {
    tempfile::NamedTempFile::new_in(dir)
        .map(drop)
        .map_err(|e| format!("{} is not writable: {}", dir.display(), e))
}

/// Parse output like `Python 3.12.1` or `Python 3.13.0rc1` into a version.
pub fn parse_runtime_version(output: &str) -> Option<Version> {
    let token = output
        .split_whitespace()
        .find(|t| t.chars().next().is_some_and(|c| c.is_ascii_digit()))?;

    let mut parts = token.split('.').map(|p| {
        p.chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>()
    });

    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

    Some(Version::new(major, minor, patch))
}
