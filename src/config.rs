use std::env;
use std::fs;
use std::path::Path;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::prompt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    3001
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            endpoint: None,
        }
    }
}

fn default_model() -> String {
    "gemini-1.5-flash-latest".into()
}

/// Keys for the outbound tools. A missing key degrades the tool to a
/// configuration-error reply instead of disabling it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default)]
    pub openweather_api_key: Option<String>,
    #[serde(default)]
    pub news_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_location")]
    pub location: String,
    /// IANA name used to render wall-clock context for the model.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            location: default_location(),
            timezone: default_timezone(),
        }
    }
}

impl AgentSettings {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone.parse().map_err(|_| {
            AgentError::Protocol(format!("unknown timezone `{}` in agent config", self.timezone))
        })
    }
}

fn default_max_iterations() -> usize {
    8
}

fn default_location() -> String {
    prompt::DEFAULT_LOCATION.into()
}

fn default_timezone() -> String {
    "Asia/Kolkata".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| AgentError::Protocol(format!("Failed to parse configuration: {err}")))?;
        Ok(cfg)
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env();
        Ok(cfg)
    }

    /// Defaults overridden by the environment, for deployments with no file.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    fn apply_env(&mut self) {
        if let Ok(host) = env::var("SYNAPSE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("SYNAPSE_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                self.server.port = parsed;
            }
        }
        if let Ok(origins) = env::var("SYNAPSE_ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(model) = env::var("SYNAPSE_MODEL") {
            self.model.model = model;
        }
        if let Ok(key) = env::var("GEMINI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Ok(endpoint) = env::var("SYNAPSE_GEMINI_ENDPOINT") {
            self.model.endpoint = Some(endpoint);
        }
        if let Ok(key) = env::var("OPENWEATHER_API_KEY") {
            self.tools.openweather_api_key = Some(key);
        }
        if let Ok(key) = env::var("NEWS_API_KEY") {
            self.tools.news_api_key = Some(key);
        }
        if let Ok(max) = env::var("SYNAPSE_MAX_ITERATIONS") {
            if let Ok(parsed) = max.parse::<usize>() {
                self.agent.max_iterations = parsed;
            }
        }
        if let Ok(location) = env::var("SYNAPSE_LOCATION") {
            self.agent.location = location;
        }
        if let Ok(timezone) = env::var("SYNAPSE_TIMEZONE") {
            self.agent.timezone = timezone;
        }
    }
}
