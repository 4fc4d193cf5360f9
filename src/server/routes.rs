//! HTTP route handlers for the chat relay API.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::conversation::core::errors::StoreError;
use crate::conversation::core::ids::SessionId;
use crate::conversation::core::message::{FormattedMessage, Message, MessageMetadata, Role};
use crate::conversation::core::session::{Session, SessionStats, SessionSummary};
use crate::conversation::store::DEFAULT_CLEANUP_MAX_AGE;

use super::error::ApiError;
use super::state::AppState;

/// Accepted shape of caller-supplied session ids.
const SESSION_ID_PATTERN: &str = r"^[A-Za-z0-9_.-]{1,128}$";

static SESSION_ID_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat))
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/cleanup", post(cleanup_sessions))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/history", get(session_history))
        .route("/api/sessions/{id}/stats", get(session_stats))
        .route("/api/sessions/{id}/extend", post(extend_session))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chat-relay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Validate a caller-supplied session id.
fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    let valid = SESSION_ID_REGEX
        .get_or_init(|| Regex::new(SESSION_ID_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(raw));

    if valid {
        Ok(SessionId::new(raw))
    } else {
        Err(ApiError::BadRequest(format!("Invalid session id: {raw:?}")))
    }
}

/// Decode an optional JSON body; an empty body yields the default.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

/// Chat request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Session to continue; a new one is created when absent or unknown.
    pub session_id: Option<String>,
}

/// Chat response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Session the exchange was stored in.
    pub session_id: SessionId,
    /// The assistant's reply text.
    pub response: String,
    /// The stored assistant message.
    pub message: Message,
}

/// Use the requested session, creating it if needed.
async fn resolve_session(state: &AppState, requested: Option<&str>) -> Result<SessionId, ApiError> {
    let Some(raw) = requested else {
        return Ok(state.store.create_session(None).await?.id);
    };

    let id = parse_session_id(raw)?;
    state.store.get_or_create_session(&id).await?;
    Ok(id)
}

/// Model input for a session: its formatted history plus the system prompt.
async fn build_context(
    state: &AppState,
    session_id: &SessionId,
) -> Result<Vec<FormattedMessage>, ApiError> {
    let mut context = state.store.get_formatted_messages(session_id, true).await?;

    if let Some(prompt) = &state.system_prompt {
        if !context.iter().any(|m| m.role == Role::System) {
            context.insert(0, FormattedMessage::new(Role::System, prompt.clone()));
        }
    }
    Ok(context)
}

/// Handle a chat turn: store the user message, ask the model, store the reply.
async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }

    let session_id = resolve_session(&state, request.session_id.as_deref()).await?;
    state
        .store
        .add_message(&session_id, Role::User, request.message, MessageMetadata::new())
        .await?;

    let context = build_context(&state, &session_id).await?;
    let completion = state.model.complete(context).await?;

    let mut metadata = MessageMetadata::new();
    metadata.insert("model".to_string(), completion.model.clone().into());
    if let Some(usage) = completion.usage {
        metadata.insert(
            "usage".to_string(),
            serde_json::to_value(usage).map_err(StoreError::from)?,
        );
    }

    let message = state
        .store
        .add_message(&session_id, Role::Assistant, completion.content.clone(), metadata)
        .await?;

    Ok(Json(ChatResponse {
        session_id,
        response: completion.content,
        message,
    }))
}

/// Session creation request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Optional caller-chosen id.
    pub session_id: Option<String>,
}

/// Create an empty session.
async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let request: CreateSessionRequest = optional_json(&body)?;
    let id = request.session_id.as_deref().map(parse_session_id).transpose()?;
    let session = state.store.create_session(id).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Session listing response.
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    /// Summaries, most recently active first.
    pub sessions: Vec<SessionSummary>,
    /// Number of sessions.
    pub count: usize,
}

/// List every live session.
async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let sessions = state.store.get_all_sessions().await?;
    let count = sessions.len();
    Ok(Json(SessionListResponse { sessions, count }))
}

/// Fetch a full session.
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let id = parse_session_id(&id)?;
    state
        .store
        .get_session(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {id}")))
}

/// Delete a session.
async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_session_id(&id)?;
    if state.store.delete_session(&id).await? {
        Ok(Json(serde_json::json!({ "deleted": true })))
    } else {
        Err(ApiError::NotFound(format!("Session not found: {id}")))
    }
}

/// History query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of messages to return.
    pub limit: Option<usize>,
}

/// History response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    /// Session identifier.
    pub session_id: SessionId,
    /// Most recent messages, oldest first.
    pub messages: Vec<Message>,
}

/// Recent messages of a session.
async fn session_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    let limit = query
        .limit
        .unwrap_or(state.store.config().history_limit);
    let messages = state.store.get_conversation_history(&id, limit).await?;
    Ok(Json(HistoryResponse {
        session_id: id,
        messages,
    }))
}

/// Message statistics of a session.
async fn session_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStats>, ApiError> {
    let id = parse_session_id(&id)?;
    state
        .store
        .get_session_stats(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {id}")))
}

/// Reset a session's TTL.
async fn extend_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_session_id(&id)?;
    if state.store.extend_session(&id).await? {
        Ok(Json(serde_json::json!({ "extended": true })))
    } else {
        Err(ApiError::NotFound(format!("Session not found: {id}")))
    }
}

/// Largest idle threshold a timestamp difference can express.
const MAX_CLEANUP_AGE_MS: u64 = i64::MAX.unsigned_abs();

/// Cleanup request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    /// Idle threshold in milliseconds; defaults to 7 days.
    pub max_age_ms: Option<u64>,
}

/// Delete sessions idle for longer than the requested age.
async fn cleanup_sessions(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request: CleanupRequest = optional_json(&body)?;
    let max_age = match request.max_age_ms {
        None => DEFAULT_CLEANUP_MAX_AGE,
        Some(ms) if ms > MAX_CLEANUP_AGE_MS => {
            return Err(ApiError::BadRequest(format!(
                "maxAgeMs must be at most {MAX_CLEANUP_AGE_MS}"
            )));
        }
        Some(ms) => Duration::from_millis(ms),
    };
    let deleted = state.store.cleanup_old_sessions(max_age).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::body::Body;
    use axum::http::Request;
    use chrono::{DateTime, TimeDelta, Utc};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::conversation::backend::InMemoryBackend;
    use crate::conversation::core::clock::ManualClock;
    use crate::conversation::core::config::StoreConfig;
    use crate::conversation::store::ConversationStore;
    use crate::llm::{ChatCompletion, ChatModel, LlmError, LlmFuture, LlmResult, TokenUsage};

    /// Model that echoes the last user message and records its inputs.
    #[derive(Default)]
    struct EchoModel {
        fail: bool,
        calls: Mutex<Vec<Vec<FormattedMessage>>>,
    }

    impl ChatModel for EchoModel {
        fn complete(
            &self,
            messages: Vec<FormattedMessage>,
        ) -> LlmFuture<'_, LlmResult<ChatCompletion>> {
            Box::pin(async move {
                if self.fail {
                    return Err(LlmError::EmptyResponse);
                }
                let last = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                if let Ok(mut calls) = self.calls.lock() {
                    calls.push(messages);
                }
                Ok(ChatCompletion {
                    content: format!("echo: {last}"),
                    model: "echo-1".to_string(),
                    usage: Some(TokenUsage::new(4, 2)),
                })
            })
        }

        fn model_name(&self) -> &str {
            "echo-1"
        }
    }

    struct Harness {
        clock: Arc<ManualClock>,
        model: Arc<EchoModel>,
        state: Arc<AppState>,
    }

    fn harness_with(model: EchoModel, system_prompt: Option<&str>) -> Harness {
        let clock = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
        let backend = Arc::new(InMemoryBackend::new(clock.clone()));
        let store = ConversationStore::new(backend, StoreConfig::default())
            .expect("valid config")
            .with_clock(clock.clone());
        let model = Arc::new(model);
        let state = AppState::new(
            Arc::new(store),
            model.clone(),
            system_prompt.map(str::to_string),
        );
        Harness {
            clock,
            model,
            state,
        }
    }

    fn harness() -> Harness {
        harness_with(EchoModel::default(), None)
    }

    async fn send(state: &Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = create_router(Arc::clone(state))
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let h = harness();
        let (status, body) = send(&h.state, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn chat_creates_session_and_stores_both_turns() {
        let h = harness();
        let (status, body) = send(&h.state, "POST", "/api/chat", Some(json!({"message": "hello"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "echo: hello");
        assert_eq!(body["message"]["model"], "echo-1");
        assert_eq!(body["message"]["usage"]["totalTokens"], 6);

        let id = SessionId::new(body["sessionId"].as_str().expect("session id"));
        let formatted = h
            .state
            .store
            .get_formatted_messages(&id, false)
            .await
            .expect("formatted");
        assert_eq!(
            formatted,
            [
                FormattedMessage::new(Role::User, "hello"),
                FormattedMessage::new(Role::Assistant, "echo: hello"),
            ]
        );
    }

    #[tokio::test]
    async fn chat_continues_session_with_system_prompt() {
        let h = harness_with(EchoModel::default(), Some("Be brief."));
        let first = json!({"message": "one", "sessionId": "s1"});
        let (status, _) = send(&h.state, "POST", "/api/chat", Some(first)).await;
        assert_eq!(status, StatusCode::OK);

        let second = json!({"message": "two", "sessionId": "s1"});
        let (status, body) = send(&h.state, "POST", "/api/chat", Some(second)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessionId"], "s1");

        let calls = h.model.calls.lock().expect("calls").clone();
        assert_eq!(calls.len(), 2);
        let roles: Vec<Role> = calls[1].iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(calls[1][0].content, "Be brief.");
    }

    #[tokio::test]
    async fn blank_message_is_rejected_without_writes() {
        let h = harness();
        let (status, body) = send(&h.state, "POST", "/api/chat", Some(json!({"message": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert!(h.state.store.get_all_sessions().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn malformed_session_id_is_rejected() {
        let h = harness();
        let request = json!({"message": "hi", "sessionId": "bad id*"});
        let (status, _) = send(&h.state, "POST", "/api/chat", Some(request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn model_failure_maps_to_bad_gateway() {
        let model = EchoModel {
            fail: true,
            ..EchoModel::default()
        };
        let h = harness_with(model, None);
        let request = json!({"message": "hi", "sessionId": "s1"});
        let (status, _) = send(&h.state, "POST", "/api/chat", Some(request)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let history = h
            .state
            .store
            .get_conversation_history(&SessionId::new("s1"), 10)
            .await
            .expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn session_lifecycle_over_http() {
        let h = harness();

        let (status, created) =
            send(&h.state, "POST", "/api/sessions", Some(json!({"sessionId": "s1"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["id"], "s1");
        assert_eq!(created["messages"], json!([]));

        for text in ["a", "b", "c"] {
            let request = json!({"message": text, "sessionId": "s1"});
            send(&h.state, "POST", "/api/chat", Some(request)).await;
        }

        let (status, history) = send(&h.state, "GET", "/api/sessions/s1/history?limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        let contents: Vec<&str> = history["messages"]
            .as_array()
            .expect("messages")
            .iter()
            .filter_map(|m| m["content"].as_str())
            .collect();
        assert_eq!(contents, ["c", "echo: c"]);

        let (status, stats) = send(&h.state, "GET", "/api/sessions/s1/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["totalMessages"], 6);
        assert_eq!(stats["userMessages"], 3);
        assert_eq!(stats["assistantMessages"], 3);

        let (status, body) = send(&h.state, "POST", "/api/sessions/s1/extend", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["extended"], true);

        let (status, listing) = send(&h.state, "GET", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing["count"], 1);
        assert_eq!(listing["sessions"][0]["messageCount"], 6);

        let (status, _) = send(&h.state, "DELETE", "/api/sessions/s1", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&h.state, "GET", "/api/sessions/s1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&h.state, "DELETE", "/api/sessions/s1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&h.state, "GET", "/api/sessions/s1/stats", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_session_without_body_generates_id() {
        let h = harness();
        let (status, created) = send(&h.state, "POST", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(created["id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn cleanup_endpoint_removes_idle_sessions() {
        let h = harness();
        send(&h.state, "POST", "/api/sessions", Some(json!({"sessionId": "old"}))).await;
        h.clock.advance(TimeDelta::hours(2));
        send(&h.state, "POST", "/api/sessions", Some(json!({"sessionId": "new"}))).await;

        let request = json!({"maxAgeMs": 3_600_000});
        let (status, body) = send(&h.state, "POST", "/api/sessions/cleanup", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 1);

        let (status, _) = send(&h.state, "GET", "/api/sessions/new", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unrepresentable_cleanup_age_is_rejected() {
        let h = harness();
        send(&h.state, "POST", "/api/sessions", Some(json!({"sessionId": "s1"}))).await;

        let request = json!({"maxAgeMs": u64::MAX});
        let (status, body) = send(&h.state, "POST", "/api/sessions/cleanup", Some(request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = send(&h.state, "GET", "/api/sessions/s1", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_chat_body_gets_json_error() {
        let h = harness();
        for request in [json!({"sessionId": "s1"}), json!({"message": 42})] {
            let (status, body) = send(&h.state, "POST", "/api/chat", Some(request)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
        }
        assert!(h.state.store.get_all_sessions().await.expect("list").is_empty());
    }

    #[test]
    fn session_id_pattern() {
        assert!(parse_session_id("abc-123_x.y").is_ok());
        assert!(parse_session_id("").is_err());
        assert!(parse_session_id("a:b").is_err());
        assert!(parse_session_id(&"x".repeat(129)).is_err());
    }
}
