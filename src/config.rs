//! Configuration management
//!
//! Two layers: the per-deployment plugin configuration document (which tools
//! a plugin exposes and how handlers are tuned), and the application config
//! file holding model and network settings for the CLI.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::handler::HandlerConfig;
use crate::network::{NetworkName, NetworksConfig};
use crate::Result;

/// Handler overrides for one service, nested inside a plugin block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHandlersConfig {
    pub name: String,
    pub tools: Vec<HandlerConfig>,
}

/// Configuration block for one plugin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginEntry {
    /// Allowed tool names; absent means every tool the plugin offers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<ServiceHandlersConfig>>,
}

/// The deployment configuration surface:
/// `{plugins: [{pluginName: {tools?, services?}}]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPluginConfig {
    #[serde(default)]
    pub plugins: Vec<HashMap<String, PluginEntry>>,
}

impl AgentPluginConfig {
    /// Find the config block for a plugin by name.
    pub fn plugin_config(&self, plugin_name: &str) -> Option<&PluginEntry> {
        self.plugins.iter().find_map(|entry| entry.get(plugin_name))
    }

    /// Find a service's handler configs, searching every plugin block.
    pub fn service_config(&self, service_name: &str) -> Option<&ServiceHandlersConfig> {
        self.plugins
            .iter()
            .flat_map(|entry| entry.values())
            .flat_map(|plugin| plugin.services.iter().flatten())
            .find(|service| service.name == service_name)
    }
}

/// Sampling settings forwarded to the model provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Language-model client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider name ("openai" for any OpenAI-compatible endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Override for OpenAI-compatible gateways
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub settings: ModelSettings,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            settings: ModelSettings::default(),
        }
    }
}

/// Application configuration for the CLI binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,

    pub networks: NetworksConfig,

    /// Watch-only wallet addresses per network.
    #[serde(default)]
    pub wallet_addresses: HashMap<NetworkName, String>,

    #[serde(default)]
    pub plugins: Option<AgentPluginConfig>,

    /// System prompt for the agent.
    #[serde(default)]
    pub system_message: Option<String>,
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".djinn")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load application configuration from the default path
pub fn load() -> Result<AppConfig> {
    load_from(&config_path())
}

/// Load application configuration from a file
pub fn load_from(path: &PathBuf) -> Result<AppConfig> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config not found at {:?}. Create one with model and network settings.",
            path
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}

/// Save application configuration to the default path
pub fn save(config: &AppConfig) -> Result<()> {
    let path = config_path();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(())
}
