//! `KEY=VALUE` env files consumed by the agent containers.
//!
//! Values are literal: no quoting, no escaping, no variable expansion.
//! Key order is significant because some agents read the file line by line.

use crate::error::{InstallError, Result};
use std::fs;
use std::path::Path;

/// Key and raw value of an entry line; `None` for blanks, comments and
/// lines without `=`.
fn split_entry(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then_some((key, value))
}

/// Values read from an existing env file or packaged template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    entries: Vec<(String, String)>,
}

impl EnvFile {
    /// Parse env file text. Blank lines and `#` comments are skipped; for a
    /// key that appears more than once the first line wins.
    pub fn parse(content: &str) -> Self {
        let mut entries: Vec<(String, String)> = Vec::new();

        for line in content.lines() {
            let Some((key, value)) = split_entry(line) else {
                continue;
            };
            if entries.iter().any(|(k, _)| k == key) {
                continue;
            }
            entries.push((key.to_string(), value.trim_end_matches('\r').to_string()));
        }

        Self { entries }
    }

    /// Read a file if it exists. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(Self::parse(&content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(InstallError::fs(path, e)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

/// Fully resolved values for one agent, in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationSet {
    entries: Vec<(String, String)>,
}

impl ConfigurationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key. An existing key keeps its position.
    pub fn insert(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
        } else {
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// One `KEY=VALUE` line per entry, newline terminated.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

/// Replace the first entry for `key` in `content` with `KEY=value`, leaving
/// every other byte untouched. The entry is found the same way
/// [`EnvFile::parse`] finds it, and keeps its indentation. Appends the line
/// when the key is absent.
pub fn substitute_line(content: &str, key: &str, value: &str) -> String {
    let mut out = String::with_capacity(content.len() + value.len());
    let mut replaced = false;

    for line in content.split_inclusive('\n') {
        if !replaced && split_entry(line).is_some_and(|(k, _)| k == key) {
            let indent = &line[..line.len() - line.trim_start().len()];
            out.push_str(indent);
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            if line.ends_with("\r\n") {
                out.push_str("\r\n");
            } else if line.ends_with('\n') {
                out.push('\n');
            }
            replaced = true;
        } else {
            out.push_str(line);
        }
    }

    if !replaced {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }

    out
}

/// Rewrite a single key of an env file on disk in place. The file keeps its
/// permissions because it is written through the existing inode.
pub fn rewrite_key(path: &Path, key: &str, value: &str) -> Result<()> {
    let content = fs::read_to_string(path).map_err(|e| InstallError::fs(path, e))?;
    let updated = substitute_line(&content, key, value);
    if updated != content {
        fs::write(path, updated).map_err(|e| InstallError::fs(path, e))?;
    }
    Ok(())
}
