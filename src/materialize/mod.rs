//! Configuration materialization: resolve each agent's values, ask the
//! operator to confirm or override them, and write the env files.
//!
//! All agents are resolved before any file is written, so a rejected
//! answer leaves the target untouched.

pub mod defaults;
pub mod prompt;

use crate::agents::{AgentDescriptor, KeyKind};
use crate::config::InvalidChoice;
use crate::environment::TargetEnvironment;
use crate::envfile::{ConfigurationSet, EnvFile};
use crate::error::{InstallError, Result};
use crate::stage::StageLog;
use defaults::{judge, resolve, LayeredDefaults, Verdict};
use prompt::{Prompter, Question};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Owner read/write only.
pub const ENV_FILE_MODE: u32 = 0o600;
const SECRETS_DIR_MODE: u32 = 0o700;

pub struct ConfigMaterializer<'a> {
    env: &'a TargetEnvironment,
    agents: &'a [&'static AgentDescriptor],
    on_invalid: InvalidChoice,
    hostname: String,
}

impl<'a> ConfigMaterializer<'a> {
    pub fn new(
        env: &'a TargetEnvironment,
        agents: &'a [&'static AgentDescriptor],
        on_invalid: InvalidChoice,
    ) -> Self {
        Self {
            env,
            agents,
            on_invalid,
            hostname: defaults::host_name(),
        }
    }

    /// Override the host name used for host-derived defaults.
    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = hostname.to_string();
        self
    }

    /// Resolve, prompt and write every agent's env file. Returns the
    /// written paths.
    pub fn materialize(
        &self,
        prompter: &mut dyn Prompter,
        log: &mut StageLog,
    ) -> Result<Vec<PathBuf>> {
        let mut resolved: Vec<(PathBuf, ConfigurationSet)> = Vec::new();

        for agent in self.agents {
            let Some(dest) = self.env.env_file(agent) else {
                continue;
            };
            prompter.notify(&format!("\n── {} ──", agent.name));
            let set = self.resolve_agent(agent, &dest, prompter)?;
            resolved.push((dest, set));
        }

        if resolved.is_empty() {
            return Ok(Vec::new());
        }

        let secrets = self.env.secrets_dir();
        self.env.ensure_dir(&secrets)?;
        if let Err(e) = restrict(&secrets, SECRETS_DIR_MODE) {
            log.warn(format!(
                "Could not restrict permissions on {}: {}",
                secrets.display(),
                e
            ));
        }

        let mut written = Vec::new();
        for (dest, set) in resolved {
            write_env_file(&dest, &set, log)?;
            tracing::info!("wrote {} ({} keys)", dest.display(), set.len());
            written.push(dest);
        }
        Ok(written)
    }

    fn resolve_agent(
        &self,
        agent: &AgentDescriptor,
        dest: &Path,
        prompter: &mut dyn Prompter,
    ) -> Result<ConfigurationSet> {
        let prior = EnvFile::load(dest)?;
        let template = match self.env.bundle_template(agent) {
            Some(path) => EnvFile::load(&path)?,
            None => None,
        };
        let defaults = LayeredDefaults::new(prior.as_ref(), template.as_ref(), &self.hostname);

        let answers = gather(agent, &defaults, prompter, self.on_invalid)?;
        resolve(agent, &defaults, &answers, self.on_invalid)
    }
}

/// Ask for every non-derived key until each answer is acceptable.
pub fn gather(
    agent: &AgentDescriptor,
    defaults: &LayeredDefaults<'_>,
    prompter: &mut dyn Prompter,
    on_invalid: InvalidChoice,
) -> Result<HashMap<String, String>> {
    let mut answers = HashMap::new();

    for key in agent.keys {
        if key.is_derived() {
            continue;
        }

        let default = defaults.value(key);
        let choices = match key.kind {
            KeyKind::Choice(allowed) => Some(allowed),
            _ => None,
        };
        let question = Question {
            key: key.name,
            help: key.help,
            default: default.as_deref(),
            secret: key.is_secret(),
            choices,
        };

        loop {
            let input = prompter.ask(&question)?;
            match judge(key, default.as_deref(), &input, on_invalid) {
                Verdict::Accept(value) => {
                    answers.insert(key.name.to_string(), value);
                    break;
                }
                Verdict::Reprompt(reason) => prompter.notify(&format!("  {}", reason)),
                Verdict::Reject(err) => return Err(err),
            }
        }
    }

    Ok(answers)
}

/// Write an env file readable only by its owner. Failing to restrict the
/// mode is a warning; failing to write is fatal.
pub fn write_env_file(path: &Path, set: &ConfigurationSet, log: &mut StageLog) -> Result<()> {
    let mut file = open_owner_only(path, log)?;
    file.write_all(set.render().as_bytes())
        .map_err(|e| InstallError::fs(path, e))
}

/// Open `path` truncated, with its mode narrowed before any byte is written.
fn open_owner_only(path: &Path, log: &mut StageLog) -> Result<fs::File> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(ENV_FILE_MODE)
        .open(path)
        .map_err(|e| InstallError::fs(path, e))?;

    // `mode` only applies on create; an existing file keeps its old bits.
    if let Err(e) = restrict(path, ENV_FILE_MODE) {
        log.warn(format!(
            "Could not restrict permissions on {}: {}",
            path.display(),
            e
        ));
    }
    Ok(file)
}

fn restrict(path: &Path, mode: u32) -> std::io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}
