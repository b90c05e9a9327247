use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::tool::Tool;
use crate::tools::{http_client, require_str};

const OPENWEATHER_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5";

/// Current-conditions lookup against OpenWeatherMap.
///
/// Degrades to plain-text replies instead of errors when the key is missing
/// or the upstream is unhappy, so the model can explain the situation.
pub struct WeatherTool {
    api_key: Option<String>,
    endpoint: String,
    timeout_secs: u64,
}

impl WeatherTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            endpoint: OPENWEATHER_ENDPOINT.to_string(),
            timeout_secs: 15,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "getWeather"
    }

    fn description(&self) -> &str {
        "Gets the current weather for a specific city."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "OBJECT",
            "properties": {
                "city": { "type": "STRING", "description": "The city name, e.g., \"London\" or \"Tokyo\"" }
            },
            "required": ["city"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let city = require_str(&input, "city", "getWeather")?;
        let Some(api_key) = &self.api_key else {
            return Ok(json!("Weather API Key is not configured."));
        };

        let url = format!(
            "{}/weather?q={}&appid={}&units=metric",
            self.endpoint,
            urlencoding::encode(city),
            api_key
        );

        let client = http_client(self.timeout_secs, "getWeather")?;
        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(_) => return Ok(json!("Failed to connect to the weather service.")),
        };
        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(_) => return Ok(json!("Failed to connect to the weather service.")),
        };

        // OpenWeatherMap reports errors in-band: `cod` is the number 200 on
        // success and a string code plus `message` otherwise.
        if data.get("cod").and_then(Value::as_i64) != Some(200) {
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Ok(json!(format!("Error fetching weather: {message}")));
        }

        Ok(json!({
            "location": data["name"],
            "temperature": format!("{}°C", data["main"]["temp"]),
            "feels_like": format!("{}°C", data["main"]["feels_like"]),
            "description": data["weather"][0]["description"],
            "humidity": format!("{}%", data["main"]["humidity"]),
        }))
    }
}
