use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::tool::Tool;
use crate::tools::{http_client, require_str};

const NEWSAPI_ENDPOINT: &str = "https://newsapi.org/v2";

/// Headline search against NewsAPI, trimmed to the five top headlines.
pub struct NewsTool {
    api_key: Option<String>,
    endpoint: String,
    timeout_secs: u64,
}

impl NewsTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            endpoint: NEWSAPI_ENDPOINT.to_string(),
            timeout_secs: 15,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Tool for NewsTool {
    fn name(&self) -> &str {
        "getNews"
    }

    fn description(&self) -> &str {
        "Fetches the latest news headlines. Use this for any news-related query. The 'topic' parameter can be ANY subject the user asks about, such as 'AI', 'politics', 'Tesla', 'sports', etc."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "OBJECT",
            "properties": {
                "topic": { "type": "STRING", "description": "The subject to search for news on. Can be any topic." }
            },
            "required": ["topic"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let topic = require_str(&input, "topic", "getNews")?;
        let Some(api_key) = &self.api_key else {
            return Ok(json!("News API Key is not configured."));
        };

        let url = format!(
            "{}/top-headlines?q={}&apiKey={}&pageSize=5",
            self.endpoint,
            urlencoding::encode(topic),
            api_key
        );

        let client = http_client(self.timeout_secs, "getNews")?;
        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(_) => return Ok(json!("Failed to connect to the news service.")),
        };

        if !response.status().is_success() {
            let reason = response
                .status()
                .canonical_reason()
                .unwrap_or("unknown status");
            let data: Value = response.json().await.unwrap_or_default();
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Ok(json!(format!("Error from News API: {reason} - {message}")));
        }

        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(_) => return Ok(json!("Failed to connect to the news service.")),
        };

        let headlines: Vec<Value> = data
            .get("articles")
            .and_then(Value::as_array)
            .map(|articles| {
                articles
                    .iter()
                    .map(|article| {
                        json!({
                            "title": article["title"],
                            "source": article["source"]["name"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Value::Array(headlines))
    }
}
