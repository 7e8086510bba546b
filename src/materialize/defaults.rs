//! Default resolution and answer validation, free of any terminal I/O.

use crate::agents::{AgentDescriptor, Fallback, KeyKind, KeySpec};
use crate::config::InvalidChoice;
use crate::envfile::{ConfigurationSet, EnvFile};
use crate::error::{InstallError, Result};
use std::collections::HashMap;

/// Where a default value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The env file written by an earlier run
    Prior,
    /// The packaged template
    Template,
    /// Built-in fallback
    Fallback,
}

/// Layered default lookup: prior run, then packaged template, then the
/// key's built-in fallback. Secret keys skip the template layer.
#[derive(Debug, Clone)]
pub struct LayeredDefaults<'a> {
    prior: Option<&'a EnvFile>,
    template: Option<&'a EnvFile>,
    hostname: String,
}

impl<'a> LayeredDefaults<'a> {
    pub fn new(prior: Option<&'a EnvFile>, template: Option<&'a EnvFile>, hostname: &str) -> Self {
        Self {
            prior,
            template,
            hostname: hostname.to_string(),
        }
    }

    pub fn lookup(&self, key: &KeySpec) -> Option<(String, Source)> {
        let non_empty = |v: &str| (!v.is_empty()).then(|| v.to_string());

        if let Some(value) = self.prior.and_then(|p| p.get(key.name)).and_then(non_empty) {
            return Some((value, Source::Prior));
        }

        if !key.is_secret() {
            if let Some(value) = self.template.and_then(|t| t.get(key.name)).and_then(non_empty) {
                return Some((value, Source::Template));
            }
        }

        match key.fallback {
            Fallback::None => None,
            Fallback::Literal(value) => Some((value.to_string(), Source::Fallback)),
            Fallback::Hostname => Some((self.hostname.clone(), Source::Fallback)),
        }
    }

    pub fn value(&self, key: &KeySpec) -> Option<String> {
        self.lookup(key).map(|(v, _)| v)
    }
}

/// Decision on one operator answer.
#[derive(Debug)]
pub enum Verdict {
    Accept(String),
    /// Ask again, telling the operator why
    Reprompt(String),
    /// End the run
    Reject(InstallError),
}

/// Judge raw operator input for a key. Empty input means "take the default".
pub fn judge(
    key: &KeySpec,
    default: Option<&str>,
    input: &str,
    on_invalid: InvalidChoice,
) -> Verdict {
    let input = input.trim();
    let value = if input.is_empty() {
        default.unwrap_or("").to_string()
    } else {
        input.to_string()
    };

    if value.is_empty() {
        return Verdict::Reprompt(format!("{} is required", key.name));
    }

    if let KeyKind::Choice(allowed) = key.kind {
        let normalized = value.to_ascii_lowercase();
        if allowed.contains(&normalized.as_str()) {
            return Verdict::Accept(normalized);
        }
        let err = InstallError::InvalidChoice {
            key: key.name.to_string(),
            value,
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        };
        return match on_invalid {
            InvalidChoice::Abort => Verdict::Reject(err),
            InvalidChoice::Reprompt => Verdict::Reprompt(err.to_string()),
        };
    }

    Verdict::Accept(value)
}

/// Build an agent's configuration from defaults and operator answers
/// without prompting. Keys missing from `answers` take their default;
/// derived keys always take their default.
pub fn resolve(
    agent: &AgentDescriptor,
    defaults: &LayeredDefaults<'_>,
    answers: &HashMap<String, String>,
    on_invalid: InvalidChoice,
) -> Result<ConfigurationSet> {
    let mut set = ConfigurationSet::new();

    for key in agent.keys {
        let default = defaults.value(key);

        if key.is_derived() {
            let value = default.ok_or_else(|| {
                InstallError::InvalidConfig(format!("{} has no placeholder value", key.name))
            })?;
            set.insert(key.name, &value);
            continue;
        }

        let input = answers.get(key.name).map(String::as_str).unwrap_or("");
        match judge(key, default.as_deref(), input, on_invalid) {
            Verdict::Accept(value) => set.insert(key.name, &value),
            Verdict::Reject(err) => return Err(err),
            Verdict::Reprompt(reason) => {
                return Err(if key.is_secret() {
                    InstallError::EmptySecret(key.name.to_string())
                } else {
                    InstallError::InvalidConfig(reason)
                })
            }
        }
    }

    Ok(set)
}

/// Host name used for host-derived defaults.
pub fn host_name() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
