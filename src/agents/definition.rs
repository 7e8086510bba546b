//! Static descriptions of the satellite agents.

/// What to do when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// The failure ends the run
    Abort,
    /// The failure is recorded as a warning and the run continues
    Warn,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Abort => "abort",
            FailurePolicy::Warn => "warn",
        }
    }
}

/// How an agent's container image is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStyle {
    /// Run an agent-provided script with the build context as working directory
    Script { script: &'static str },
    /// `podman build --no-cache -t <tag> <context>`
    Generic { tag: &'static str },
}

/// Role a configurable key plays in prompting and resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Ordinary value, prompted with a resolved default
    Plain,
    /// Never defaulted from the packaged template
    Secret,
    /// Value must be one of the listed options
    Choice(&'static [&'static str]),
    /// Not prompted; holds a placeholder until activation discovers the real value
    Derived,
}

/// Last-resort default when neither a prior run nor the template has a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    None,
    Literal(&'static str),
    Hostname,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    pub name: &'static str,
    pub kind: KeyKind,
    pub fallback: Fallback,
    pub help: &'static str,
}

impl KeySpec {
    pub fn is_secret(&self) -> bool {
        matches!(self.kind, KeyKind::Secret)
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, KeyKind::Derived)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub name: &'static str,
    /// Files copied from the bundle into `image_builds/<name>/`
    pub source_files: &'static [&'static str],
    /// Declarative unit files owned by this agent
    pub units: &'static [&'static str],
    /// Env file name under `secrets/`, also the packaged template name
    pub env_file: Option<&'static str>,
    /// Keys in the order they are written to the env file
    pub keys: &'static [KeySpec],
    pub build: Option<BuildStyle>,
    pub build_policy: FailurePolicy,
}

impl AgentDescriptor {
    pub fn key(&self, name: &str) -> Option<&KeySpec> {
        self.keys.iter().find(|k| k.name == name)
    }

    /// The key that receives the discovered control socket path, if any.
    pub fn derived_key(&self) -> Option<&KeySpec> {
        self.keys.iter().find(|k| k.is_derived())
    }
}

/// Service name the supervisor generates from a declarative unit file.
///
/// `foo.container` becomes `foo.service`, `foo.network` becomes
/// `foo-network.service`. Anything else is returned unchanged.
pub fn derived_service_name(unit_file: &str) -> String {
    if let Some(stem) = unit_file.strip_suffix(".container") {
        format!("{}.service", stem)
    } else if let Some(stem) = unit_file.strip_suffix(".network") {
        format!("{}-network.service", stem)
    } else if let Some(stem) = unit_file.strip_suffix(".volume") {
        format!("{}-volume.service", stem)
    } else {
        unit_file.to_string()
    }
}
