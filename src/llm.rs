//! Model backend abstraction and implementations: the Gemini REST client used
//! in production and a scripted stub for tests.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ModelConfig;
use crate::error::{AgentError, Result};
use crate::tool::ToolDeclaration;
use crate::turn::{Role, ToolCallRequest, Turn, TurnContent};

/// Stream of text fragments from an in-flight completion.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// What the model decided to do in one reasoning round.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// The model wants tool output before it can continue.
    ToolCalls(Vec<ToolCallRequest>),
    /// Plain text, either an intermediate thought or the final answer.
    Text(String),
}

/// Abstraction over a tool-calling chat backend.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(
        &self,
        history: &[Turn],
        system_instruction: &str,
        tools: &[ToolDeclaration],
    ) -> Result<ModelReply>;

    /// Re-issue the last exchange as a streaming request, yielding text
    /// fragments as the backend produces them.
    async fn generate_streaming(
        &self,
        history: &[Turn],
        system_instruction: &str,
        tools: &[ToolDeclaration],
    ) -> Result<ChunkStream>;
}

fn classify_status(status: reqwest::StatusCode, body: &str) -> AgentError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return AgentError::QuotaExhausted(format!("Gemini rate limit exceeded: {body}"));
    }
    AgentError::LanguageModel(format!("Gemini request failed with {status}: {body}"))
}

#[derive(Clone, Debug)]
pub struct GeminiClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            AgentError::LanguageModel("missing Gemini API key in model config".into())
        })?;
        let endpoint = cfg
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|err| AgentError::LanguageModel(format!("http client error: {err}")))?,
            model: cfg.model.clone(),
            api_key,
            endpoint,
        })
    }

    fn to_contents(&self, history: &[Turn]) -> Vec<GeminiContent> {
        history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Model => "model",
                };
                let parts = match &turn.content {
                    TurnContent::Text(text) => vec![GeminiPart::text(text.clone())],
                    TurnContent::ToolCalls(calls) => calls
                        .iter()
                        .map(|call| {
                            GeminiPart::function_call(GeminiFunctionCall {
                                name: call.name.clone(),
                                args: call.arguments.clone(),
                            })
                        })
                        .collect(),
                    TurnContent::ToolResults(results) => results
                        .iter()
                        .map(|result| {
                            GeminiPart::function_response(GeminiFunctionResponse {
                                name: result.name.clone(),
                                response: json!({ "result": result.result }),
                            })
                        })
                        .collect(),
                };
                GeminiContent {
                    role: role.to_string(),
                    parts,
                }
            })
            .collect()
    }

    fn request_payload(
        &self,
        history: &[Turn],
        system_instruction: &str,
        tools: &[ToolDeclaration],
    ) -> Value {
        let mut payload = json!({
            "contents": self.to_contents(history),
            "systemInstruction": { "parts": [{ "text": system_instruction }] },
        });
        if !tools.is_empty() {
            payload["tools"] = json!([{ "functionDeclarations": tools }]);
        }
        payload
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(
        &self,
        history: &[Turn],
        system_instruction: &str,
        tools: &[ToolDeclaration],
    ) -> Result<ModelReply> {
        let payload = self.request_payload(history, system_instruction, tools);
        let resp = self
            .http
            .post(format!(
                "{}/models/{}:generateContent?key={}",
                self.endpoint, self.model, self.api_key
            ))
            .json(&payload)
            .send()
            .await
            .map_err(|err| AgentError::LanguageModel(format!("Gemini request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: GeminiResponse = resp.json().await.map_err(|err| {
            AgentError::LanguageModel(format!("Gemini response parse error: {err}"))
        })?;

        Ok(reply_from_response(parsed))
    }

    async fn generate_streaming(
        &self,
        history: &[Turn],
        system_instruction: &str,
        tools: &[ToolDeclaration],
    ) -> Result<ChunkStream> {
        let payload = self.request_payload(history, system_instruction, tools);
        let resp = self
            .http
            .post(format!(
                "{}/models/{}:streamGenerateContent?alt=sse&key={}",
                self.endpoint, self.model, self.api_key
            ))
            .json(&payload)
            .send()
            .await
            .map_err(|err| AgentError::LanguageModel(format!("Gemini request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let stream = resp
            .bytes_stream()
            .map(|chunk| match chunk {
                Ok(bytes) => Ok(extract_sse_text(&String::from_utf8_lossy(&bytes))),
                Err(err) => Err(AgentError::LanguageModel(format!(
                    "Gemini stream error: {err}"
                ))),
            })
            .filter(|chunk| {
                futures::future::ready(!matches!(chunk, Ok(text) if text.is_empty()))
            });

        Ok(Box::pin(stream))
    }
}

/// Collapse one Gemini response into the call-vs-text decision. Function
/// calls win over text and every requested call is kept, in response order.
fn reply_from_response(response: GeminiResponse) -> ModelReply {
    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    let calls: Vec<ToolCallRequest> = parts
        .iter()
        .filter_map(|part| {
            part.function_call
                .as_ref()
                .map(|call| ToolCallRequest::new(call.name.clone(), call.args.clone()))
        })
        .collect();
    if !calls.is_empty() {
        return ModelReply::ToolCalls(calls);
    }

    let text: String = parts.into_iter().filter_map(|part| part.text).collect();
    ModelReply::Text(text)
}

/// Pull the text deltas out of one SSE payload. Unparseable data lines are
/// skipped so a stray keep-alive never kills the stream.
fn extract_sse_text(payload: &str) -> String {
    let mut text = String::new();
    for line in payload.lines() {
        if !line.starts_with("data: ") {
            continue;
        }
        let data = line.trim_start_matches("data: ").trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }
        if let Ok(parsed) = serde_json::from_str::<GeminiResponse>(data) {
            let parts = parsed
                .candidates
                .into_iter()
                .next()
                .and_then(|candidate| candidate.content)
                .map(|content| content.parts)
                .unwrap_or_default();
            for part in parts {
                if let Some(delta) = part.text {
                    text.push_str(&delta);
                }
            }
        }
    }
    text
}

/// A deterministic model for tests. Each `generate` call pops the next
/// scripted reply; a text reply is also staged so the follow-up
/// `generate_streaming` call can replay it in small chunks.
pub struct StubModel {
    script: Mutex<VecDeque<StubReply>>,
    pending_stream: Mutex<Option<String>>,
    generate_calls: AtomicUsize,
}

#[derive(Debug, Clone)]
pub enum StubReply {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
    Quota(String),
    Failure(String),
}

impl StubReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self::ToolCalls(vec![ToolCallRequest::new(name, arguments)])
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self::ToolCalls(calls)
    }

    pub fn quota(detail: impl Into<String>) -> Self {
        Self::Quota(detail.into())
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self::Failure(detail.into())
    }
}

impl StubModel {
    pub fn new(script: Vec<StubReply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            pending_stream: Mutex::new(None),
            generate_calls: AtomicUsize::new(0),
        })
    }

    /// Number of `generate` rounds consumed so far.
    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for StubModel {
    async fn generate(
        &self,
        _history: &[Turn],
        _system_instruction: &str,
        _tools: &[ToolDeclaration],
    ) -> Result<ModelReply> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .script
            .lock()
            .expect("stub model poisoned")
            .pop_front()
            .ok_or_else(|| {
                AgentError::LanguageModel("StubModel ran out of scripted replies".into())
            })?;

        match reply {
            StubReply::Text(content) => {
                *self.pending_stream.lock().expect("stub model poisoned") = Some(content.clone());
                Ok(ModelReply::Text(content))
            }
            StubReply::ToolCalls(calls) => Ok(ModelReply::ToolCalls(calls)),
            StubReply::Quota(detail) => Err(AgentError::QuotaExhausted(detail)),
            StubReply::Failure(detail) => Err(AgentError::LanguageModel(detail)),
        }
    }

    async fn generate_streaming(
        &self,
        _history: &[Turn],
        _system_instruction: &str,
        _tools: &[ToolDeclaration],
    ) -> Result<ChunkStream> {
        let staged = self
            .pending_stream
            .lock()
            .expect("stub model poisoned")
            .take()
            .ok_or_else(|| {
                AgentError::LanguageModel("StubModel has no staged text to stream".into())
            })?;
        let chunks: Vec<Result<String>> = split_chunks(&staged).into_iter().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

fn split_chunks(content: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in content.chars() {
        current.push(ch);
        if current.len() >= 8 {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(rename = "functionResponse", skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

impl GeminiPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Self::default()
        }
    }

    fn function_call(call: GeminiFunctionCall) -> Self {
        Self {
            function_call: Some(call),
            ..Self::default()
        }
    }

    fn function_response(response: GeminiFunctionResponse) -> Self {
        Self {
            function_response: Some(response),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::ToolCallResult;

    fn test_client() -> GeminiClient {
        let cfg = ModelConfig {
            model: "gemini-1.5-flash-latest".to_string(),
            api_key: Some("test-key".to_string()),
            endpoint: None,
        };
        GeminiClient::from_config(&cfg).unwrap()
    }

    #[test]
    fn from_config_requires_an_api_key() {
        let cfg = ModelConfig {
            model: "gemini-1.5-flash-latest".to_string(),
            api_key: None,
            endpoint: None,
        };
        let err = GeminiClient::from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("missing Gemini API key"));
    }

    #[test]
    fn contents_map_every_turn_variant_to_wire_parts() {
        let client = test_client();
        let history = vec![
            Turn::user("add 10 and 15"),
            Turn::tool_calls(vec![ToolCallRequest::new(
                "sum",
                json!({ "num1": 10, "num2": 15 }),
            )]),
            Turn::tool_results(vec![ToolCallResult::new("sum", json!(25.0))]),
            Turn::model("The sum is 25."),
        ];

        let contents = serde_json::to_value(client.to_contents(&history)).unwrap();
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "add 10 and 15");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "sum");
        assert_eq!(
            contents[1]["parts"][0]["functionCall"]["args"]["num2"],
            json!(15)
        );
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"]["result"],
            json!(25.0)
        );
        assert_eq!(contents[3]["parts"][0]["text"], "The sum is 25.");
    }

    #[test]
    fn payload_omits_tools_when_none_are_registered() {
        let client = test_client();
        let payload = client.request_payload(&[Turn::user("hi")], "be helpful", &[]);
        assert!(payload.get("tools").is_none());
        assert_eq!(
            payload["systemInstruction"]["parts"][0]["text"],
            "be helpful"
        );
    }

    #[test]
    fn payload_advertises_declarations_when_present() {
        let client = test_client();
        let tools = vec![ToolDeclaration {
            name: "prime".to_string(),
            description: "Checks if a number is a prime number.".to_string(),
            parameters: Some(json!({ "type": "OBJECT" })),
        }];
        let payload = client.request_payload(&[Turn::user("is 7 prime?")], "sys", &tools);
        assert_eq!(
            payload["tools"][0]["functionDeclarations"][0]["name"],
            "prime"
        );
    }

    #[test]
    fn function_calls_win_over_text_and_all_are_kept() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Thinking..." },
                        { "functionCall": { "name": "getWeather", "args": { "city": "London" } } },
                        { "functionCall": { "name": "getNews", "args": { "topic": "London" } } }
                    ]
                }
            }]
        });
        let parsed: GeminiResponse = serde_json::from_value(raw).unwrap();
        match reply_from_response(parsed) {
            ModelReply::ToolCalls(calls) => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].name, "getWeather");
                assert_eq!(calls[0].arguments, json!({ "city": "London" }));
                assert_eq!(calls[1].name, "getNews");
            }
            reply => panic!("expected tool calls, got {reply:?}"),
        }
    }

    #[test]
    fn text_parts_are_joined_when_no_calls_are_present() {
        let raw = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello " }, { "text": "world" }] }
            }]
        });
        let parsed: GeminiResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(
            reply_from_response(parsed),
            ModelReply::Text("Hello world".to_string())
        );
    }

    #[test]
    fn empty_candidates_collapse_to_empty_text() {
        let parsed: GeminiResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(reply_from_response(parsed), ModelReply::Text(String::new()));
    }

    #[test]
    fn sse_payloads_yield_their_text_deltas() {
        let payload = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"The \"}]}}]}\n",
            "\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"answer\"}]}}]}\n",
            "data: [DONE]\n",
        );
        assert_eq!(extract_sse_text(payload), "The answer");
    }

    #[test]
    fn malformed_sse_lines_are_skipped() {
        let payload = "data: not json\nevent: ping\n";
        assert_eq!(extract_sse_text(payload), "");
    }

    #[test]
    fn quota_status_maps_to_quota_exhausted() {
        let err = classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, AgentError::QuotaExhausted(_)));
        assert!(err.to_string().contains("slow down"));
    }

    #[test]
    fn other_statuses_map_to_language_model_errors() {
        let err = classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(err, AgentError::LanguageModel(_)));
    }

    #[tokio::test]
    async fn stub_stages_text_replies_for_streaming() {
        let stub = StubModel::new(vec![StubReply::text("A final answer from the stub.")]);
        let reply = stub.generate(&[], "", &[]).await.unwrap();
        assert_eq!(
            reply,
            ModelReply::Text("A final answer from the stub.".to_string())
        );

        let mut stream = stub.generate_streaming(&[], "", &[]).await.unwrap();
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            collected.push_str(&chunk.unwrap());
        }
        assert_eq!(collected, "A final answer from the stub.");
        assert_eq!(stub.generate_calls(), 1);
    }

    #[tokio::test]
    async fn stub_errors_when_the_script_runs_dry() {
        let stub = StubModel::new(Vec::new());
        let err = stub.generate(&[], "", &[]).await.unwrap_err();
        assert!(err.to_string().contains("ran out of scripted replies"));
    }

    #[test]
    fn chunking_preserves_multibyte_boundaries() {
        let chunks = split_chunks("héllo wörld, this is streaming");
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), "héllo wörld, this is streaming");
    }
}
