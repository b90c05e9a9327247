//! Concurrent tool dispatch. Every call in a batch runs at once and the
//! results come back in request order, with failures folded into `Error: `
//! strings so one bad call never sinks the batch.

use futures::future::join_all;
use serde_json::Value;
use tracing::warn;

use crate::tool::ToolRegistry;
use crate::turn::{ToolCallRequest, ToolCallResult};

#[derive(Default, Clone)]
pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run a batch of tool calls concurrently.
    ///
    /// The output holds exactly one result per request, in the same order the
    /// model asked for them. A call that fails, including a call to a name
    /// that was never registered, yields a string starting with `Error: `
    /// instead of poisoning its siblings.
    pub async fn dispatch(&self, calls: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        let invocations = calls.iter().map(|call| {
            let registry = self.registry.clone();
            let call = call.clone();
            async move {
                let result = match registry.call(&call.name, call.arguments.clone()).await {
                    Ok(value) => value,
                    Err(err) => {
                        warn!(tool = %call.name, "tool call failed: {err}");
                        Value::String(format!("Error: {err}"))
                    }
                };
                ToolCallResult::new(call.name, result)
            }
        });
        join_all(invocations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::tool::Tool;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// Replies with its label after sleeping, so interleavings are visible.
    struct SlowTool {
        label: &'static str,
        delay_ms: u64,
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            self.label
        }

        fn description(&self) -> &str {
            "Sleeps then answers"
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(Value::String(self.label.to_string()))
        }
    }

    fn staggered_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool {
            label: "slow",
            delay_ms: 40,
        });
        registry.register(SlowTool {
            label: "medium",
            delay_ms: 20,
        });
        registry.register(SlowTool {
            label: "fast",
            delay_ms: 1,
        });
        registry
    }

    fn call(name: &str) -> ToolCallRequest {
        ToolCallRequest::new(name, json!({}))
    }

    #[tokio::test]
    async fn results_keep_request_order_despite_completion_order() {
        let executor = ToolExecutor::new(staggered_registry());
        let results = executor
            .dispatch(&[call("slow"), call("medium"), call("fast")])
            .await;
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["slow", "medium", "fast"]);
        assert_eq!(results[0].result, json!("slow"));
        assert_eq!(results[2].result, json!("fast"));
    }

    #[tokio::test]
    async fn batch_runs_concurrently_not_sequentially() {
        let executor = ToolExecutor::new(staggered_registry());
        let started = std::time::Instant::now();
        let results = executor
            .dispatch(&[call("slow"), call("slow"), call("slow")])
            .await;
        assert_eq!(results.len(), 3);
        // Three 40ms sleeps side by side finish well under the 120ms a
        // sequential run would need.
        assert!(started.elapsed() < Duration::from_millis(110));
    }

    #[tokio::test]
    async fn unknown_tool_fails_alone_without_sinking_the_batch() {
        let executor = ToolExecutor::new(staggered_registry());
        let results = executor
            .dispatch(&[call("fast"), call("doesNotExist"), call("medium")])
            .await;
        assert_eq!(results[0].result, json!("fast"));
        assert_eq!(
            results[1].result,
            json!("Error: tool `doesNotExist` not found")
        );
        assert!(results[1].is_error());
        assert_eq!(results[2].result, json!("medium"));
    }

    #[tokio::test]
    async fn duplicate_names_produce_one_result_each() {
        let executor = ToolExecutor::new(staggered_registry());
        let results = executor
            .dispatch(&[call("fast"), call("fast"), call("fast")])
            .await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.name == "fast"));
        assert!(results.iter().all(|r| r.result == json!("fast")));
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_results() {
        let executor = ToolExecutor::new(ToolRegistry::new());
        let results = executor.dispatch(&[]).await;
        assert!(results.is_empty());
    }
}
