//! Bring installed units live: reload the supervisor, confirm the generated
//! services exist, publish the control socket path, start services.

use crate::agents::{derived_service_name, registry, AgentDescriptor};
use crate::environment::TargetEnvironment;
use crate::envfile;
use crate::error::{InstallError, Result};
use crate::preflight::SUPERVISOR_TOOL;
use crate::process::Invocation;
use crate::stage::{ensure_success, StageLog};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

const SOCKET_UNIT: &str = "podman.socket";

pub struct ServiceActivator<'a> {
    env: &'a TargetEnvironment,
    agents: &'a [&'static AgentDescriptor],
}

impl<'a> ServiceActivator<'a> {
    pub fn new(env: &'a TargetEnvironment, agents: &'a [&'static AgentDescriptor]) -> Self {
        Self { env, agents }
    }

    /// Everything before the first start: reload, verify generated units,
    /// discover the socket and write it into the env files that need it.
    pub fn prepare(&self, log: &mut StageLog) -> Result<PathBuf> {
        self.reload(log);
        self.verify_units()?;
        self.activate_socket(log);
        let socket = self.discover_socket()?;
        tracing::info!("control socket: {}", socket.display());
        self.publish_socket(&socket)?;
        Ok(socket)
    }

    /// Regenerate units from the declarative files. A failure here is only
    /// a warning; `verify_units` catches the consequences.
    pub fn reload(&self, log: &mut StageLog) {
        let result = self
            .systemctl(&["daemon-reload"])
            .and_then(|out| ensure_success(&out, InstallError::ServiceControl));
        if let Err(e) = result {
            log.warn(format!("daemon-reload failed: {}", e));
        }
    }

    /// Generated service names expected from the installed unit files.
    pub fn expected_services(&self) -> Vec<String> {
        let mut units = vec![derived_service_name(registry::NETWORK_UNIT)];
        for agent in self.agents {
            units.extend(agent.units.iter().map(|u| derived_service_name(u)));
        }
        units
    }

    /// Every expected generated service must be known to the supervisor.
    pub fn verify_units(&self) -> Result<()> {
        for service in self.expected_services() {
            let output = self.systemctl(&["list-unit-files", "--no-legend", &service])?;
            let found = output
                .stdout
                .lines()
                .any(|line| line.split_whitespace().next() == Some(service.as_str()));
            if !found {
                return Err(InstallError::MissingUnit(service));
            }
        }
        Ok(())
    }

    /// Ask the supervisor to socket-activate the container runtime.
    pub fn activate_socket(&self, log: &mut StageLog) {
        let result = self
            .systemctl(&["enable", "--now", SOCKET_UNIT])
            .and_then(|out| ensure_success(&out, InstallError::ServiceControl));
        if let Err(e) = result {
            log.warn(format!("could not enable {}: {}", SOCKET_UNIT, e));
        }
    }

    /// First candidate path that is a socket.
    pub fn discover_socket(&self) -> Result<PathBuf> {
        find_socket(self.env.socket_candidates())
            .ok_or_else(|| InstallError::SocketNotFound(self.env.socket_candidates().to_vec()))
    }

    /// Rewrite the derived socket key in each env file that declares one.
    pub fn publish_socket(&self, socket: &Path) -> Result<()> {
        let value = socket.to_string_lossy();
        for agent in self.agents {
            let (Some(key), Some(path)) = (agent.derived_key(), self.env.env_file(agent)) else {
                continue;
            };
            envfile::rewrite_key(&path, key.name, &value)?;
            tracing::info!("set {} in {}", key.name, path.display());
        }
        Ok(())
    }

    /// Start the shared network. Failure is a warning; agents can still
    /// come up on the default network.
    pub fn start_network(&self, log: &mut StageLog) {
        self.start(&derived_service_name(registry::NETWORK_UNIT), log);
    }

    /// Start each agent's services. One failing agent does not stop the others.
    pub fn start_agents(&self, log: &mut StageLog) {
        for agent in self.agents {
            for unit in agent.units {
                self.start(&derived_service_name(unit), log);
            }
        }
    }

    fn start(&self, service: &str, log: &mut StageLog) {
        let result = self
            .systemctl(&["start", service])
            .and_then(|out| ensure_success(&out, InstallError::ServiceControl));
        match result {
            Ok(()) => tracing::info!("started {}", service),
            Err(e) => log.warn(format!("failed to start {}: {}", service, e)),
        }
    }

    fn systemctl(&self, args: &[&str]) -> Result<crate::process::CommandOutput> {
        let mut full = vec!["--user"];
        full.extend_from_slice(args);
        self.env
            .runner()
            .run(&Invocation::new(SUPERVISOR_TOOL, &full))
    }
}

/// First path in `candidates` that exists and is a socket.
pub fn find_socket(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|path| {
            std::fs::metadata(path)
                .map(|m| m.file_type().is_socket())
                .unwrap_or(false)
        })
        .cloned()
}
