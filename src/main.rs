//! Service entry point: wire the config, the Gemini backend, the toolbox,
//! and the HTTP boundary together.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use synapse_agent::{
    default_toolkit, Agent, AgentError, AgentService, AppConfig, GeminiClient, Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "synapse_agent=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match env::var("SYNAPSE_CONFIG") {
        Ok(path) => AppConfig::from_env_or_file(path)?,
        Err(_) => AppConfig::from_env(),
    };
    info!(model = %config.model.model, "configuration loaded");

    let model = Arc::new(GeminiClient::from_config(&config.model)?);
    let agent = Agent::new(model)
        .with_tools(default_toolkit(&config.tools))
        .with_max_iterations(config.agent.max_iterations)
        .with_location(config.agent.location.clone())
        .with_timezone(config.agent.tz()?);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|err| AgentError::Protocol(format!("invalid listen address: {err}")))?;

    AgentService::new(agent)
        .with_allowed_origins(config.server.allowed_origins.clone())
        .serve(addr)
        .await
}
