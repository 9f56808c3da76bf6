//! Loading of the JSON configuration, the properties file and identity stores

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::Configuration;
use crate::model::User;
use crate::{Error, Result};

/// Locations of the resource files under one root directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceLayout {
    root: PathBuf,
}

impl Default for ResourceLayout {
    fn default() -> Self {
        Self::new(".")
    }
}

impl ResourceLayout {
    /// Layout rooted at `root`; files live under `root/properties/`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file(&self, name: &str) -> PathBuf {
        self.root.join("properties").join(name)
    }

    /// Service declarations
    pub fn configuration(&self) -> PathBuf {
        self.file("platform.json")
    }

    /// Run settings
    pub fn properties(&self) -> PathBuf {
        self.file("platform.properties")
    }

    /// Registry identity records
    pub fn registry_users(&self) -> PathBuf {
        self.file("users.json")
    }

    /// Platform identity records
    pub fn platform_users(&self) -> PathBuf {
        self.file("platform-users.json")
    }
}

/// Load the root configuration document.
///
/// A missing or unparsable file is fatal: nothing can be resolved without it.
pub fn load_configuration(path: &Path) -> Result<Configuration> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        Error::json_configuration_missing(path.display().to_string(), e.to_string())
    })?;
    let configuration = serde_json::from_str(&data).map_err(|e| {
        Error::json_configuration_missing(path.display().to_string(), e.to_string())
    })?;
    debug!(path = %path.display(), "Loaded environment configuration");
    Ok(configuration)
}

/// Load a properties file, returning empty properties if it is missing.
pub fn load_properties(path: &Path) -> Properties {
    match std::fs::read_to_string(path) {
        Ok(data) => Properties::parse(&data),
        Err(e) => {
            info!(path = %path.display(), error = %e, "Properties file wasn't found, using defaults");
            Properties::default()
        }
    }
}

/// Load an identity store: a JSON object mapping login to identity record.
///
/// A missing file yields an empty store; a malformed one is an error.
pub fn load_users(path: &Path) -> Result<BTreeMap<String, User>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Identity store not found, no users loaded");
            return Ok(BTreeMap::new());
        }
        Err(e) => {
            return Err(Error::json_configuration_missing(
                path.display().to_string(),
                e.to_string(),
            ))
        }
    };

    serde_json::from_str(&data).map_err(|e| {
        Error::serialization(format!("invalid identity store {}: {}", path.display(), e))
    })
}

/// Flat `key=value` settings in Java properties syntax
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    /// Parse properties text.
    ///
    /// Supports `=`, `:` and whitespace separators, `#`/`!` comments and
    /// backslash line continuations.
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        let mut logical = String::new();

        for raw in text.lines() {
            let line = raw.trim_start();
            if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!'))
            {
                continue;
            }

            match line.strip_suffix('\\') {
                Some(head) => {
                    logical.push_str(head);
                    continue;
                }
                None => logical.push_str(line),
            }

            if let Some((key, value)) = split_entry(&logical) {
                entries.insert(key, value);
            }
            logical.clear();
        }

        if let Some((key, value)) = split_entry(&logical) {
            entries.insert(key, value);
        }

        Self(entries)
    }

    /// Value of `key`, if set and non-empty
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Set `key` to `value`
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
}

fn split_entry(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let split_at = line
        .find(|c: char| c == '=' || c == ':' || c.is_whitespace())
        .unwrap_or(line.len());
    let (key, rest) = line.split_at(split_at);
    let rest = rest.trim_start();
    let value = rest
        .strip_prefix('=')
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(rest)
        .trim();
    Some((key.to_string(), value.to_string()))
}
