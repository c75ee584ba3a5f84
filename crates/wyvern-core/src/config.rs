use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WyvernError};

/// Top-level Wyvern configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WyvernConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Workflow definitions.
    #[serde(default)]
    pub soars: Vec<SoarConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pause between two tick passes of one soar. Default: 500 ms.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

fn default_interval_ms() -> u64 { 500 }

impl SchedulerConfig {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// SQLite database file. Default: wyvern.db
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    "wyvern.db".to_string()
}

impl StoreConfig {
    /// Resolve the store path (expand ~).
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(rest) = self.path.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        PathBuf::from(&self.path)
    }
}

/// One workflow: a name plus a flat list of flaps. Edges are declared inline
/// by name, from either end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoarConfig {
    pub name: String,
    #[serde(default)]
    pub flaps: Vec<FlapConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlapConfig {
    /// Unique within the soar.
    pub name: String,
    pub plugin: String,
    /// Opaque block handed to the action's `from_config`.
    #[serde(default)]
    pub plugin_config: serde_json::Value,
    #[serde(default)]
    pub prev_flaps: Vec<String>,
    #[serde(default)]
    pub next_flaps: Vec<String>,
}

impl FlapConfig {
    pub fn new(name: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugin: plugin.into(),
            plugin_config: serde_json::Value::Null,
            prev_flaps: vec![],
            next_flaps: vec![],
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.plugin_config = config;
        self
    }

    pub fn after(mut self, prev: impl Into<String>) -> Self {
        self.prev_flaps.push(prev.into());
        self
    }

    pub fn before(mut self, next: impl Into<String>) -> Self {
        self.next_flaps.push(next.into());
        self
    }
}

impl WyvernConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| WyvernError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| WyvernError::Config(e.to_string()))
    }

    /// Find a soar definition by name.
    pub fn soar(&self, name: &str) -> Option<&SoarConfig> {
        self.soars.iter().find(|s| s.name == name)
    }

    pub fn soar_names(&self) -> Vec<&str> {
        self.soars.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Replace each `${NAME}` with the value of that environment variable.
/// Unset names and an unterminated `${` are left as written.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        rest = &rest[open..];
        let Some(len) = rest.find('}') else {
            break;
        };
        let placeholder = &rest[..=len];
        match std::env::var(&placeholder[2..len]) {
            Ok(value) => out.push_str(&value),
            Err(_) => out.push_str(placeholder),
        }
        rest = &rest[len + 1..];
    }
    out.push_str(rest);
    out
}
