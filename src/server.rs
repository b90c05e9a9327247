//! HTTP boundary exposing the agent loop. One service instance owns one
//! agent; conversation state lives entirely on the caller's side and rides
//! in with every request.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::{Agent, AgentOutcome};
use crate::error::{AgentError, Result};
use crate::llm::ModelClient;
use crate::turn::Turn;

pub struct AgentService<M: ModelClient> {
    agent: Arc<Agent<M>>,
    allowed_origins: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    success: bool,
    final_response: String,
    history: Vec<Turn>,
}

impl<M: ModelClient + 'static> AgentService<M> {
    pub fn new(agent: Agent<M>) -> Self {
        Self {
            agent: Arc::new(agent),
            allowed_origins: Vec::new(),
        }
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    pub fn router(self) -> Router {
        let cors = cors_layer(&self.allowed_origins);
        Router::new()
            .route("/", get(Self::index))
            .route("/health", get(Self::health))
            .route("/chat", post(Self::chat))
            .fallback(Self::not_found)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(self))
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        info!(%addr, "agent service listening");
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }

    async fn index() -> impl IntoResponse {
        Json(json!({
            "name": "Synapse Agent API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Advanced AI agent with multi-step reasoning capabilities",
            "endpoints": { "health": "/health", "chat": "/chat" },
            "documentation": "Use POST /chat with message and history in request body",
        }))
    }

    async fn health() -> impl IntoResponse {
        Json(json!({
            "status": "OK",
            "message": "Synapse Agent API is running",
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }

    async fn chat(State(state): State<Arc<Self>>, Json(payload): Json<Value>) -> Response {
        let Some(message) = payload
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.trim().is_empty())
        else {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Message is required",
                    "message": "Please provide a message in the request body",
                })),
            )
                .into_response();
        };

        let history = match parse_history(&payload) {
            Ok(history) => history,
            Err(detail) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Invalid history format",
                        "message": detail,
                    })),
                )
                    .into_response();
            }
        };

        let request_id = Uuid::new_v4();
        info!(%request_id, turns = history.len(), "processing chat request");

        let outcome = state.agent.run(message, &history).await;
        respond_with_outcome(request_id, outcome)
    }

    async fn not_found(uri: Uri) -> impl IntoResponse {
        (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "Not found",
                "message": format!("Route {uri} not found"),
                "availableEndpoints": ["/", "/health", "/chat"],
            })),
        )
    }
}

fn parse_history(payload: &Value) -> std::result::Result<Vec<Turn>, String> {
    match payload.get("history") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(history @ Value::Array(_)) => serde_json::from_value(history.clone())
            .map_err(|err| format!("History entries could not be parsed: {err}")),
        Some(_) => Err("History must be an array".to_string()),
    }
}

fn respond_with_outcome(request_id: Uuid, outcome: AgentOutcome) -> Response {
    match outcome.failure {
        Some(AgentError::QuotaExhausted(detail)) => {
            warn!(%request_id, "quota exhausted: {detail}");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Rate limit exceeded",
                    "message": "You have exceeded the API quota limit. Please try again later or upgrade your plan.",
                    "details": detail,
                })),
            )
                .into_response()
        }
        Some(err) => {
            warn!(%request_id, "agent run failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error",
                    "message": "An error occurred while processing your request",
                    "details": err.to_string(),
                })),
            )
                .into_response()
        }
        None => {
            info!(%request_id, "chat request completed");
            Json(ChatResponse {
                success: true,
                final_response: outcome.final_response,
                history: outcome.history,
            })
            .into_response()
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let parsed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok());
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::NoThrottle;
    use crate::llm::{StubModel, StubReply};

    fn service(script: Vec<StubReply>) -> Arc<AgentService<StubModel>> {
        let agent = Agent::new(StubModel::new(script))
            .with_throttle(Arc::new(NoThrottle))
            .with_max_iterations(1);
        Arc::new(AgentService::new(agent))
    }

    async fn call_chat(
        service: Arc<AgentService<StubModel>>,
        payload: Value,
    ) -> (StatusCode, Value) {
        let response = AgentService::chat(State(service), Json(payload)).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_message_is_rejected() {
        let (status, body) = call_chat(service(Vec::new()), json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Message is required");
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let (status, body) = call_chat(service(Vec::new()), json!({ "message": "   " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Message is required");
    }

    #[tokio::test]
    async fn non_array_history_is_rejected() {
        let payload = json!({ "message": "hi", "history": "not-a-list" });
        let (status, body) = call_chat(service(Vec::new()), payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid history format");
        assert_eq!(body["message"], "History must be an array");
    }

    #[tokio::test]
    async fn malformed_history_entries_are_rejected() {
        let payload = json!({
            "message": "hi",
            "history": [{ "role": "narrator", "content": { "text": "once upon a time" } }]
        });
        let (status, body) = call_chat(service(Vec::new()), payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid history format");
    }

    #[tokio::test]
    async fn successful_runs_return_the_answer_and_history() {
        let script = vec![StubReply::text("All done.")];
        let payload = json!({ "message": "finish up", "history": [] });
        let (status, body) = call_chat(service(script), payload).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["finalResponse"], "All done.");
        let history = body["history"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["role"], "user");
        assert_eq!(history[1]["role"], "model");
    }

    #[tokio::test]
    async fn prior_history_rides_into_the_run() {
        let script = vec![StubReply::text("Continuing.")];
        let payload = json!({
            "message": "next question",
            "history": [
                { "role": "user", "content": { "text": "first question" } },
                { "role": "model", "content": { "text": "first answer" } }
            ]
        });
        let (status, body) = call_chat(service(script), payload).await;

        assert_eq!(status, StatusCode::OK);
        let history = body["history"].as_array().unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0]["content"]["text"], "first question");
    }

    #[tokio::test]
    async fn quota_failures_map_to_too_many_requests() {
        let script = vec![StubReply::quota("daily limit reached")];
        let payload = json!({ "message": "anything" });
        let (status, body) = call_chat(service(script), payload).await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Rate limit exceeded");
        assert!(body["details"]
            .as_str()
            .unwrap()
            .contains("daily limit reached"));
    }

    #[tokio::test]
    async fn other_backend_failures_map_to_internal_error() {
        let script = vec![StubReply::failure("backend melted")];
        let payload = json!({ "message": "anything" });
        let (status, body) = call_chat(service(script), payload).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert!(body["details"].as_str().unwrap().contains("backend melted"));
    }

    #[tokio::test]
    async fn unknown_routes_list_the_available_endpoints() {
        let response = AgentService::<StubModel>::not_found("/nope".parse().unwrap())
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Not found");
        assert_eq!(body["message"], "Route /nope not found");
        assert_eq!(body["availableEndpoints"], json!(["/", "/health", "/chat"]));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = AgentService::<StubModel>::health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "OK");
    }
}
