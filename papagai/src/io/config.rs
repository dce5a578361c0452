//! User configuration stored under `$XDG_CONFIG_HOME/papagai/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::core::isolation::Isolation;
use crate::core::naming::TOOL_NAME;
use crate::io::workspace::overlay;

/// papagai configuration (TOML).
///
/// Every field is optional in the file; command-line flags override it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PapagaiConfig {
    /// Isolation used when `--isolation` is not given.
    pub isolation: Isolation,

    /// Keep workspaces after a run unless `--no-keep` is given.
    pub keep: bool,

    /// Override for the cache root that holds overlay layers.
    pub cache_dir: Option<PathBuf>,

    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable and leading arguments (e.g. `["claude"]`).
    pub command: Vec<String>,

    /// Tools allowed in addition to the built-in list.
    pub allowed_tools: Vec<String>,

    /// Kill the agent after this many seconds; `0` waits forever.
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string()],
            allowed_tools: Vec::new(),
            timeout_secs: 0,
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for PapagaiConfig {
    fn default() -> Self {
        Self {
            isolation: Isolation::Auto,
            keep: false,
            cache_dir: None,
            agent: AgentConfig::default(),
        }
    }
}

impl PapagaiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        if self.agent.allowed_tools.iter().any(|t| t.trim().is_empty()) {
            return Err(anyhow!("agent.allowed_tools must not contain empty entries"));
        }
        if let Some(dir) = &self.cache_dir
            && dir.as_os_str().is_empty()
        {
            return Err(anyhow!("cache_dir must not be empty"));
        }
        Ok(())
    }

    /// The configured cache root, else the XDG cache directory.
    pub fn cache_root(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => overlay::default_cache_root()
                .context("could not determine the cache directory; set cache_dir in the config"),
        }
    }
}

/// `$XDG_CONFIG_HOME/papagai`, or the platform equivalent.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(TOOL_NAME))
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PapagaiConfig::default()`.
pub fn load_config(path: &Path) -> Result<PapagaiConfig> {
    if !path.exists() {
        let cfg = PapagaiConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PapagaiConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Load the config from its default location, or defaults if there is none.
pub fn load_default_config() -> Result<PapagaiConfig> {
    match default_config_path() {
        Some(path) => load_config(&path),
        None => Ok(PapagaiConfig::default()),
    }
}
