use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};

use crate::error::Result;
use crate::tool::Tool;
use crate::tools::require_str;

pub struct WorldTimeTool;

#[async_trait]
impl Tool for WorldTimeTool {
    fn name(&self) -> &str {
        "getWorldTime"
    }

    fn description(&self) -> &str {
        "Gets the current time for a given IANA timezone."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "OBJECT",
            "properties": {
                "timezone": {
                    "type": "STRING",
                    "description": "The IANA timezone name, e.g., \"America/New_York\", \"Europe/London\", or \"Asia/Kolkata\""
                }
            },
            "required": ["timezone"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let timezone = require_str(&input, "timezone", "getWorldTime")?;
        Ok(json!(time_report(timezone, Utc::now())))
    }
}

/// An unknown zone stays a normal reply so the model can rephrase and retry
/// instead of the whole round failing.
fn time_report(timezone: &str, instant: DateTime<Utc>) -> String {
    match timezone.parse::<Tz>() {
        Ok(tz) => {
            let local = instant.with_timezone(&tz);
            format!(
                "The current time in {timezone} is {}.",
                local.format("%I:%M:%S %p")
            )
        }
        Err(_) => format!(
            "Invalid timezone provided: {timezone}. Example of a valid timezone is 'America/New_York'."
        ),
    }
}
