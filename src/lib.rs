//! Multi-step reasoning agent service backed by Gemini tool calling.
//!
//! The crate provides:
//! - A conversation model (`Turn`, `ToolCallRequest`, `ToolCallResult`).
//! - A model backend abstraction (`ModelClient`) with a Gemini REST client
//!   and a scripted stub for tests.
//! - A registry of six fixed tools (`ToolRegistry`, `default_toolkit`) and a
//!   concurrent order-preserving dispatcher (`ToolExecutor`).
//! - An `Agent` that runs the reason-act loop under a fixed iteration budget.
//! - An axum service (`AgentService`) exposing the loop over HTTP.

mod agent;
mod config;
mod error;
mod executor;
mod llm;
mod prompt;
mod server;
mod tool;
pub mod tools;
mod turn;

pub use agent::{Agent, AgentOutcome, FixedDelay, NoThrottle, Throttle, NO_ANSWER_SENTINEL};
pub use config::{AgentSettings, AppConfig, ModelConfig, ServerConfig, ToolsConfig};
pub use error::{AgentError, Result};
pub use executor::ToolExecutor;
pub use llm::{ChunkStream, GeminiClient, ModelClient, ModelReply, StubModel, StubReply};
pub use prompt::{system_instruction, DEFAULT_LOCATION};
pub use server::AgentService;
pub use tool::{Tool, ToolDeclaration, ToolRegistry};
pub use tools::default_toolkit;
pub use turn::{Role, ToolCallRequest, ToolCallResult, Turn, TurnContent};
