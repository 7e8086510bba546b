//! Install unit definitions and link them into the supervisor's discovery
//! directory.

use crate::agents::{registry, AgentDescriptor};
use crate::environment::TargetEnvironment;
use crate::error::{InstallError, Result};
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

pub struct UnitLinkManager<'a> {
    env: &'a TargetEnvironment,
    agents: &'a [&'static AgentDescriptor],
}

impl<'a> UnitLinkManager<'a> {
    pub fn new(env: &'a TargetEnvironment, agents: &'a [&'static AgentDescriptor]) -> Self {
        Self { env, agents }
    }

    /// Unit files handled by this run: the shared network first, then each
    /// agent's units.
    pub fn unit_files(&self) -> Vec<&'static str> {
        let mut units = vec![registry::NETWORK_UNIT];
        for agent in self.agents {
            units.extend(agent.units.iter().copied());
        }
        units
    }

    /// Copy every unit into `quadlets/` and point a discovery-directory
    /// symlink at it. Units are processed one at a time; an interruption
    /// leaves the finished ones linked and the rest untouched.
    pub fn install_all(&self) -> Result<Vec<PathBuf>> {
        let units_dir = self.env.units_dir();
        self.env.ensure_dir(&units_dir)?;
        self.env.ensure_dir(self.env.discovery_dir())?;

        let mut links = Vec::new();
        for unit in self.unit_files() {
            let canonical = units_dir.join(unit);
            let source = self.env.bundle_unit(unit);
            fs::copy(&source, &canonical).map_err(|e| InstallError::fs(&source, e))?;

            let link = self.env.discovery_dir().join(unit);
            converge_link(&canonical, &link)?;
            tracing::info!("{} -> {}", link.display(), canonical.display());
            links.push(link);
        }
        Ok(links)
    }
}

/// Make `link` a symlink to `target`, whatever occupies `link` now: nothing,
/// a regular file, a live symlink or a dangling one. A directory in the way
/// is an error; it is never removed.
pub fn converge_link(target: &Path, link: &Path) -> Result<()> {
    match fs::symlink_metadata(link) {
        Ok(meta) => {
            if meta.file_type().is_dir() {
                return Err(InstallError::fs(
                    link,
                    io::Error::other("a directory occupies the unit link path"),
                ));
            }
            fs::remove_file(link).map_err(|e| InstallError::fs(link, e))?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(InstallError::fs(link, e)),
    }

    symlink(target, link).map_err(|e| InstallError::fs(link, e))
}
