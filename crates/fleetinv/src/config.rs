//! Configuration loading and types

use std::path::{Path, PathBuf};

use fleetinv_core::{AgentConfig, InventoryConfig, ResourceTypeConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the fleetinv daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon server settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Inventory engine settings
    #[serde(default)]
    pub inventory: InventoryConfig,
    /// Agents registered at startup
    #[serde(default)]
    pub agent: Vec<AgentConfig>,
    /// Resource types known to the catalog
    #[serde(default)]
    pub resource_type: Vec<ResourceTypeConfig>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Daemon server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address and port to bind to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("failed to read {}: {e}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text is not a valid configuration
    pub fn parse(content: &str) -> eyre::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default paths or use defaults
    ///
    /// Returns the configuration and the file it came from, if any.
    pub fn load_default() -> eyre::Result<(Self, Option<PathBuf>)> {
        if let Ok(path) = std::env::var("FLEETINV_CONFIG") {
            let path = PathBuf::from(path);
            return Ok((Self::load(&path)?, Some(path)));
        }

        let mut paths = vec![
            PathBuf::from("fleetinv.toml"),
            PathBuf::from("/etc/fleetinv/fleetinv.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("fleetinv/fleetinv.toml"));
        }

        for path in paths {
            if path.exists() {
                return Ok((Self::load(&path)?, Some(path)));
            }
        }

        Ok((Config::default(), None))
    }

    fn validate(&self) -> eyre::Result<()> {
        let mut names = std::collections::HashSet::new();
        for agent in &self.agent {
            if !names.insert(agent.name.as_str()) {
                eyre::bail!("agent '{}' is configured twice", agent.name);
            }
        }

        let mut types = std::collections::HashSet::new();
        for t in &self.resource_type {
            if !types.insert((t.name.as_str(), t.plugin.as_str())) {
                eyre::bail!("resource type {}/{} is configured twice", t.name, t.plugin);
            }
        }

        Ok(())
    }
}
