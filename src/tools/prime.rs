use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::tool::Tool;
use crate::tools::require_number;

pub struct PrimeTool;

#[async_trait]
impl Tool for PrimeTool {
    fn name(&self) -> &str {
        "prime"
    }

    fn description(&self) -> &str {
        "Checks if a number is a prime number."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "OBJECT",
            "properties": {
                "num": { "type": "NUMBER", "description": "The number to test for primality, e.g. 13" }
            },
            "required": ["num"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let num = require_number(&input, "num", "prime")?;
        Ok(json!(is_prime(num as i64)))
    }
}

fn is_prime(n: i64) -> bool {
    if n <= 1 {
        return false;
    }
    if n <= 3 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let mut i = 5;
    while i * i <= n {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}
