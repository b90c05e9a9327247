use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{AgentError, Result};
use crate::tool::Tool;
use crate::tools::{http_client, require_str};

const COINGECKO_ENDPOINT: &str = "https://api.coingecko.com/api/v3";

/// Spot price lookup backed by the CoinGecko markets API. Needs no API key.
pub struct CryptoPriceTool {
    endpoint: String,
    timeout_secs: u64,
}

impl CryptoPriceTool {
    pub fn new() -> Self {
        Self {
            endpoint: COINGECKO_ENDPOINT.to_string(),
            timeout_secs: 15,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for CryptoPriceTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CryptoPriceTool {
    fn name(&self) -> &str {
        "getCryptoPrice"
    }

    fn description(&self) -> &str {
        "Gets the current price of any cryptocurrency, like bitcoin."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "OBJECT",
            "properties": {
                "coin": { "type": "STRING", "description": "The cryptocurrency name, like bitcoin" }
            },
            "required": ["coin"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let coin = require_str(&input, "coin", "getCryptoPrice")?;
        let url = format!(
            "{}/coins/markets?vs_currency=usd&ids={}",
            self.endpoint,
            urlencoding::encode(coin)
        );

        let client = http_client(self.timeout_secs, "getCryptoPrice")?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|err| AgentError::ToolInvocation {
                name: "getCryptoPrice".into(),
                source: Box::new(err),
            })?;

        // The market data comes back as an array of coin entries; hand it to
        // the model unchanged.
        response
            .json()
            .await
            .map_err(|err| AgentError::ToolInvocation {
                name: "getCryptoPrice".into(),
                source: Box::new(err),
            })
    }
}
