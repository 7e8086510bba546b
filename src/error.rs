use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Preflight check '{check}' failed: {reason}")]
    Validation { check: &'static str, reason: String },

    #[error("Invalid value '{value}' for {key}. Allowed values: {}", .allowed.join(", "))]
    InvalidChoice {
        key: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("{0} is required and cannot be empty")]
    EmptySecret(String),

    #[error("Filesystem error at {}: {source}", .path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image build for {agent} failed: {reason}")]
    Build { agent: String, reason: String },

    #[error("Service control failed: {0}")]
    ServiceControl(String),

    #[error("Expected unit {0} was not generated. Check the unit definition for errors")]
    MissingUnit(String),

    #[error("No Podman control socket found. Tried: {}", format_paths(.0))]
    SocketNotFound(Vec<PathBuf>),

    #[error("{program} did not finish within {secs}s and was killed")]
    CommandTimeout { program: String, secs: u64 },

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallError {
    /// Attach a path to an IO error.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InstallError::FileSystem {
            path: path.into(),
            source,
        }
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, InstallError>;
