//! Compiled-in agent registry.

use super::definition::{AgentDescriptor, BuildStyle, FailurePolicy, Fallback, KeyKind, KeySpec};
use crate::error::{InstallError, Result};

/// Shared network unit, started before any agent.
pub const NETWORK_UNIT: &str = "satellites.network";

/// Key rewritten with the discovered control socket path.
pub const SOCKET_PATH_KEY: &str = "PODMAN_SOCKET_PATH";

/// Placeholder written until the socket is discovered.
pub const SOCKET_PATH_PLACEHOLDER: &str = "/run/podman/podman.sock";

pub const AGENT_MODES: &[&str] = &["local", "opensearch"];

const DTRACK_KEYS: &[KeySpec] = &[
    KeySpec {
        name: "DT_URL",
        kind: KeyKind::Plain,
        fallback: Fallback::None,
        help: "Dependency-Track base URL",
    },
    KeySpec {
        name: "DT_API_KEY",
        kind: KeyKind::Secret,
        fallback: Fallback::None,
        help: "Dependency-Track API key",
    },
    KeySpec {
        name: "DT_PROJECT_NAME",
        kind: KeyKind::Plain,
        fallback: Fallback::Hostname,
        help: "Root project name",
    },
    KeySpec {
        name: "DT_PROJECT_VERSION",
        kind: KeyKind::Plain,
        fallback: Fallback::Literal("v0.0.0"),
        help: "Project version prefix",
    },
    KeySpec {
        name: "SCAN_INTERVAL_SECONDS",
        kind: KeyKind::Plain,
        fallback: Fallback::Literal("3600"),
        help: "Seconds between scans",
    },
    KeySpec {
        name: "SERVER_HOSTNAME",
        kind: KeyKind::Plain,
        fallback: Fallback::Hostname,
        help: "Host name reported with each SBOM",
    },
];

const OPENSEARCH_KEYS: &[KeySpec] = &[
    KeySpec {
        name: SOCKET_PATH_KEY,
        kind: KeyKind::Derived,
        fallback: Fallback::Literal(SOCKET_PATH_PLACEHOLDER),
        help: "Podman control socket",
    },
    KeySpec {
        name: "OPENSEARCH_URL",
        kind: KeyKind::Plain,
        fallback: Fallback::Literal("http://opensearch:9200"),
        help: "OpenSearch endpoint",
    },
    KeySpec {
        name: "OPENSEARCH_INDEX_PREFIX",
        kind: KeyKind::Plain,
        fallback: Fallback::Literal("podman-logs"),
        help: "Index name prefix",
    },
    KeySpec {
        name: "NODE_NAME",
        kind: KeyKind::Plain,
        fallback: Fallback::Hostname,
        help: "Node name attached to every log document",
    },
    KeySpec {
        name: "DISCOVERY_INTERVAL_SECONDS",
        kind: KeyKind::Plain,
        fallback: Fallback::Literal("10"),
        help: "Seconds between container discovery passes",
    },
    KeySpec {
        name: "LOG_LEVEL",
        kind: KeyKind::Plain,
        fallback: Fallback::Literal("INFO"),
        help: "Agent log level",
    },
    KeySpec {
        name: "AGENT_MODE",
        kind: KeyKind::Choice(AGENT_MODES),
        fallback: Fallback::Literal("opensearch"),
        help: "Ship logs to OpenSearch or print them locally",
    },
];

pub const DTRACK: AgentDescriptor = AgentDescriptor {
    name: "dtrack",
    source_files: &["Containerfile", "agent.py", "build.sh"],
    units: &["dtrack-agent.container"],
    env_file: Some("dtrack.env"),
    keys: DTRACK_KEYS,
    build: Some(BuildStyle::Script { script: "build.sh" }),
    build_policy: FailurePolicy::Abort,
};

pub const OPENSEARCH: AgentDescriptor = AgentDescriptor {
    name: "opensearch",
    source_files: &["Containerfile", "agent.py"],
    units: &["opensearch-agent.container"],
    env_file: Some("opensearch.env"),
    keys: OPENSEARCH_KEYS,
    build: Some(BuildStyle::Generic {
        tag: "localhost/opensearch-agent:latest",
    }),
    build_policy: FailurePolicy::Warn,
};

pub const CADVISOR: AgentDescriptor = AgentDescriptor {
    name: "cadvisor",
    source_files: &[],
    units: &["cadvisor.container"],
    env_file: None,
    keys: &[],
    build: None,
    build_policy: FailurePolicy::Warn,
};

/// All agents in installation order.
pub const ALL: &[&AgentDescriptor] = &[&DTRACK, &OPENSEARCH, &CADVISOR];

pub fn get(name: &str) -> Option<&'static AgentDescriptor> {
    ALL.iter().copied().find(|a| a.name == name)
}

pub fn list_available() -> Vec<&'static str> {
    ALL.iter().map(|a| a.name).collect()
}

/// Resolve agent names to descriptors, keeping registry order and
/// dropping duplicates.
pub fn select(names: &[String]) -> Result<Vec<&'static AgentDescriptor>> {
    for name in names {
        if get(name).is_none() {
            return Err(InstallError::InvalidConfig(format!(
                "Unknown agent '{}'. Available agents: {}",
                name,
                list_available().join(", ")
            )));
        }
    }

    Ok(ALL
        .iter()
        .copied()
        .filter(|a| names.iter().any(|n| n == a.name))
        .collect())
}
