//! Configuration loading for InputBridge.
//!
//! Settings come from `~/.inputbridge/settings.json` when present, then
//! `INPUTBRIDGE_*` environment variables, then command-line flags. Every
//! field has a default, so running without any of them works.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::{OverflowPolicy, RendezvousQueue};
use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub const ENV_HOST: &str = "INPUTBRIDGE_HOST";
pub const ENV_PORT: &str = "INPUTBRIDGE_PORT";
pub const ENV_QUEUE_CAPACITY: &str = "INPUTBRIDGE_QUEUE_CAPACITY";

/// Get the InputBridge home directory (~/.inputbridge).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".inputbridge"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from the default location, falling back to defaults when
/// the file does not exist.
pub fn load_settings() -> Result<Settings> {
    let path = get_settings_path()?;

    if !path.exists() {
        tracing::debug!("No settings file at {}, using defaults", path.display());
        return Ok(Settings::default());
    }

    load_settings_from(&path)
}

/// Load and validate settings from a specific file.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Apply `INPUTBRIDGE_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup(ENV_HOST) {
        settings.web.host = host;
    }

    if let Some(port) = lookup(ENV_PORT) {
        settings.web.port = port
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} is not a valid port: {}", ENV_PORT, port)))?;
    }

    if let Some(capacity) = lookup(ENV_QUEUE_CAPACITY) {
        settings.queue.capacity = Some(capacity.trim().parse().map_err(|_| {
            Error::Config(format!(
                "{} is not a valid capacity: {}",
                ENV_QUEUE_CAPACITY, capacity
            ))
        })?);
    }

    validate_settings(settings)
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.web.host.trim().is_empty() {
        return Err(Error::Config("web.host must not be empty".to_string()));
    }
    if settings.web.port == 0 {
        return Err(Error::Config("web.port must be non-zero".to_string()));
    }
    if settings.queue.capacity == Some(0) {
        return Err(Error::Config(
            "queue.capacity must be at least 1 when set".to_string(),
        ));
    }
    if settings.agent.tool_name.trim().is_empty() {
        return Err(Error::Config("agent.tool_name must not be empty".to_string()));
    }
    Ok(())
}

/// HTTP listener configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WebSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9876
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl WebSettings {
    /// URL an operator opens in the browser.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Rendezvous queue limits. Unbounded unless `capacity` is set.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct QueueSettings {
    pub capacity: Option<usize>,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl QueueSettings {
    pub fn build_queue(&self) -> RendezvousQueue {
        RendezvousQueue::with_limits(self.capacity, self.overflow)
    }
}

/// How the bridge presents itself to the agent.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AgentSettings {
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default = "default_server_version")]
    pub server_version: String,
    #[serde(default = "default_tool_name")]
    pub tool_name: String,
    #[serde(default = "default_tool_description")]
    pub tool_description: String,
}

fn default_server_name() -> String {
    "mcp-input-server".to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_tool_name() -> String {
    "get_vscode_input".to_string()
}

fn default_tool_description() -> String {
    "Get the message that user submitted from the web input panel. Call this to receive user input."
        .to_string()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            server_version: default_server_version(),
            tool_name: default_tool_name(),
            tool_description: default_tool_description(),
        }
    }
}

/// Kill switch configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ControlSettings {
    /// Delay between acknowledging `/kill` and shutting down.
    #[serde(default = "default_kill_delay_ms")]
    pub kill_delay_ms: u64,
}

fn default_kill_delay_ms() -> u64 {
    100
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            kill_delay_ms: default_kill_delay_ms(),
        }
    }
}

/// InputBridge settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub web: WebSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub control: ControlSettings,
}
