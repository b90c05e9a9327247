//! Conversation history shared by the agent loop, the model client, and the
//! HTTP boundary. A history is an ordered list of [`Turn`]s; every tool-call
//! turn is immediately followed by the turn carrying its results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Speaker tag for a turn. Tool results ride on `user` turns because that is
/// how the Gemini protocol frames function responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One tool invocation requested by the model in a reasoning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of one tool invocation, labelled with the tool that produced it.
/// Failed invocations are carried as `Error: ` strings rather than errors so
/// the model can read them and recover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub name: String,
    pub result: Value,
}

impl ToolCallResult {
    pub fn new(name: impl Into<String>, result: Value) -> Self {
        Self {
            name: name.into(),
            result,
        }
    }

    /// True when the result carries an error marker instead of a tool value.
    pub fn is_error(&self) -> bool {
        matches!(&self.result, Value::String(text) if text.starts_with("Error: "))
    }
}

/// Payload of a turn: plain text, a batch of requested calls, or the batch of
/// results answering the previous turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnContent {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
    ToolResults(Vec<ToolCallResult>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: TurnContent::Text(text.into()),
        }
    }

    /// Model turn recording every call requested in one step, in request order.
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Model,
            content: TurnContent::ToolCalls(calls),
        }
    }

    /// Results turn answering the tool-call turn directly before it.
    pub fn tool_results(results: Vec<ToolCallResult>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::ToolResults(results),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// True for model turns with non-empty text, the only turns eligible to be
    /// a final answer.
    pub fn is_model_text(&self) -> bool {
        self.role == Role::Model
            && matches!(&self.content, TurnContent::Text(text) if !text.is_empty())
    }
}
