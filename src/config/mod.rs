//! Configuration module

use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub hub: HubConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    pub ip: String,
    #[serde(default = "default_hub_port")]
    pub port: u16,
    /// Accessory name shown in the information block
    #[serde(default = "default_name")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformConfig {
    /// Background refresh period in seconds (absent or 0 disables it)
    #[serde(default)]
    pub refresh_timer: Option<u64>,
    #[serde(default)]
    pub show_turn_off_activity: bool,
    /// Switch names that never receive a command matching their current state
    #[serde(default)]
    pub skipped_if_same_state_activities: Vec<String>,
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default)]
    pub verbose: bool,
}

impl PlatformConfig {
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_timer
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8089
}

fn default_hub_port() -> u16 {
    8088
}

fn default_name() -> String {
    "Harmony Hub".to_string()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("HARMONY")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("platform.skipped_if_same_state_activities"),
            )
            .build()?;

        settings
            .try_deserialize()
            .context("invalid configuration (hub.ip is required)")
    }

    #[cfg(test)]
    pub fn from_toml(toml: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
