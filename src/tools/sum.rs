use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::tool::Tool;
use crate::tools::require_number;

pub struct SumTool;

#[async_trait]
impl Tool for SumTool {
    fn name(&self) -> &str {
        "sum"
    }

    fn description(&self) -> &str {
        "Adds two numbers."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "OBJECT",
            "properties": {
                "num1": { "type": "NUMBER", "description": "First number to add, e.g. 10" },
                "num2": { "type": "NUMBER", "description": "Second number to add, e.g. 15" }
            },
            "required": ["num1", "num2"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let num1 = require_number(&input, "num1", "sum")?;
        let num2 = require_number(&input, "num2", "sum")?;
        Ok(json!(num1 + num2))
    }
}
