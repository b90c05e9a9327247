//! The agent's toolbox: six fixed tools matching the names the system
//! instruction advertises.
//!
//! - sum / prime: local arithmetic
//! - getCryptoPrice / getWeather / getNews: outbound HTTP lookups
//! - getWorldTime: timezone-aware clock

use std::time::Duration;

use serde_json::Value;

use crate::config::ToolsConfig;
use crate::error::{AgentError, Result};
use crate::tool::ToolRegistry;

pub mod crypto;
pub mod news;
pub mod prime;
pub mod sum;
pub mod weather;
pub mod world_time;

pub use crypto::CryptoPriceTool;
pub use news::NewsTool;
pub use prime::PrimeTool;
pub use sum::SumTool;
pub use weather::WeatherTool;
pub use world_time::WorldTimeTool;

/// Assemble the full stock toolbox.
pub fn default_toolkit(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(SumTool);
    registry.register(PrimeTool);
    registry.register(CryptoPriceTool::new());
    registry.register(WeatherTool::new(config.openweather_api_key.clone()));
    registry.register(NewsTool::new(config.news_api_key.clone()));
    registry.register(WorldTimeTool);
    registry
}

pub(crate) fn require_number(input: &Value, field: &str, tool_name: &str) -> Result<f64> {
    input
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| AgentError::Protocol(format!("missing `{field}` for {tool_name}")))
}

pub(crate) fn require_str<'a>(input: &'a Value, field: &str, tool_name: &str) -> Result<&'a str> {
    input
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::Protocol(format!("missing `{field}` for {tool_name}")))
}

pub(crate) fn http_client(timeout_secs: u64, tool_name: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|err| AgentError::ToolInvocation {
            name: tool_name.to_string(),
            source: Box::new(err),
        })
}
