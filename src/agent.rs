use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::executor::ToolExecutor;
use crate::llm::{ModelClient, ModelReply};
use crate::prompt;
use crate::tool::{ToolDeclaration, ToolRegistry};
use crate::turn::Turn;

/// Answer reported when the loop ends without any model text to harvest.
pub const NO_ANSWER_SENTINEL: &str = "No conclusive answer reached within the iteration limit.";

const DEFAULT_MAX_ITERATIONS: usize = 8;

/// Pacing applied between reasoning rounds to stay under backend rate limits.
#[async_trait]
pub trait Throttle: Send + Sync {
    async fn pause(&self);
}

/// Waits a fixed interval. The stock pacing for live backends.
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl Throttle for FixedDelay {
    async fn pause(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

/// Skips pacing entirely. For tests and scripted backends.
pub struct NoThrottle;

#[async_trait]
impl Throttle for NoThrottle {
    async fn pause(&self) {}
}

/// Everything a run produces: the answer to hand back, the full conversation
/// including this run's turns, and the terminal backend failure if one cut
/// the run short.
#[derive(Debug)]
pub struct AgentOutcome {
    pub final_response: String,
    pub history: Vec<Turn>,
    pub failure: Option<AgentError>,
}

/// A reason-act agent that alternates between the model and registered tools
/// until the model settles on an answer or the iteration budget runs out.
pub struct Agent<M: ModelClient> {
    model: Arc<M>,
    executor: ToolExecutor,
    max_iterations: usize,
    throttle: Arc<dyn Throttle>,
    location: String,
    timezone: Tz,
}

impl<M: ModelClient> Agent<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            model,
            executor: ToolExecutor::new(ToolRegistry::new()),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            throttle: Arc::new(FixedDelay::default()),
            location: prompt::DEFAULT_LOCATION.to_string(),
            timezone: chrono_tz::Asia::Kolkata,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.executor = ToolExecutor::new(tools);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_throttle(mut self, throttle: Arc<dyn Throttle>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    /// Run one user problem through the reason-act loop.
    ///
    /// The caller's history is copied, never mutated, and the copy grows by
    /// one turn pair per tool round and one turn per text round. This never
    /// returns an error: backend failures are folded into the history as an
    /// `Error: ` model turn and surfaced through [`AgentOutcome::failure`].
    pub async fn run(&self, user_problem: impl Into<String>, prior_history: &[Turn]) -> AgentOutcome {
        let mut history: Vec<Turn> = prior_history.to_vec();
        history.push(Turn::user(user_problem));

        let declarations = self.tools().describe();
        let mut failure = None;

        for iteration in 0..self.max_iterations {
            debug!(iteration, "thinking");
            let instruction = self.build_instruction(&declarations);

            let reply = match self.model.generate(&history, &instruction, &declarations).await {
                Ok(reply) => reply,
                Err(err) => {
                    warn!("model call failed: {err}");
                    history.push(failure_turn(&err));
                    failure = Some(err);
                    break;
                }
            };

            match reply {
                ModelReply::ToolCalls(calls) => {
                    let names: Vec<&str> =
                        calls.iter().map(|call| call.name.as_str()).collect();
                    info!(tools = %names.join(", "), "calling tools");
                    let results = self.executor.dispatch(&calls).await;
                    history.push(Turn::tool_calls(calls));
                    history.push(Turn::tool_results(results));
                }
                ModelReply::Text(_) => {
                    // Re-issue the round as a streaming request so callers
                    // that tap the stream see the text as it is produced.
                    match self.stream_thought(&history, &instruction, &declarations).await {
                        Ok(thought) => history.push(Turn::model(thought)),
                        Err(err) => {
                            warn!("streaming call failed: {err}");
                            history.push(failure_turn(&err));
                            failure = Some(err);
                            break;
                        }
                    }
                }
            }

            if iteration + 1 < self.max_iterations {
                self.throttle.pause().await;
            }
        }

        let final_response = last_model_text(&history)
            .unwrap_or(NO_ANSWER_SENTINEL)
            .to_string();

        AgentOutcome {
            final_response,
            history,
            failure,
        }
    }

    fn build_instruction(&self, declarations: &[ToolDeclaration]) -> String {
        let now = Utc::now().with_timezone(&self.timezone);
        prompt::system_instruction(now, &self.location, declarations)
    }

    async fn stream_thought(
        &self,
        history: &[Turn],
        instruction: &str,
        declarations: &[ToolDeclaration],
    ) -> Result<String> {
        let mut stream = self
            .model
            .generate_streaming(history, instruction, declarations)
            .await?;
        let mut thought = String::new();
        while let Some(chunk) = stream.next().await {
            thought.push_str(&chunk?);
        }
        Ok(thought)
    }
}

fn failure_turn(err: &AgentError) -> Turn {
    Turn::model(format!("Error: {err}. Please try again later."))
}

fn last_model_text(history: &[Turn]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|turn| turn.is_model_text())
        .and_then(Turn::text)
}
