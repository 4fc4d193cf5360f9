//! Chat client for Ollama-compatible `/api/chat` endpoints.
//!
//! Behaviour:
//! - Sends the whole formatted context in one non-streaming request.
//! - Keeps the model resident for `keep_alive` between calls.
//! - Reports prompt/completion token counts when the server provides them.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::LlmConfig;
use crate::conversation::core::message::{FormattedMessage, Role};
use crate::llm::error::{LlmError, LlmResult};
use crate::llm::{ChatCompletion, ChatModel, LlmFuture, TokenUsage};

/// HTTP connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on how much of an error body is kept.
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Serialize)]
struct ChatOptions {
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [FormattedMessage],
    stream: bool,
    keep_alive: &'a str,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    message: Option<ChatResponseMessage>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

/// `<base>/api/chat`, keeping any path prefix of `base`.
fn chat_endpoint(base: &str) -> LlmResult<Url> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join("api/chat")?)
}

/// Async Ollama chat client.
pub struct OllamaChat {
    client: Client,
    endpoint: Url,
    model: String,
    temperature: f64,
    max_tokens: Option<u32>,
    keep_alive: String,
}

impl OllamaChat {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let endpoint = chat_endpoint(&config.base_url)?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            keep_alive: config.keep_alive.clone(),
        })
    }

    async fn post_chat(&self, messages: &[FormattedMessage]) -> LlmResult<ChatCompletion> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            keep_alive: &self.keep_alive,
            options: ChatOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .message
            .map(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        let usage = match (body.prompt_eval_count, body.eval_count) {
            (None, None) => None,
            (prompt, completion) => Some(TokenUsage::new(
                prompt.unwrap_or(0),
                completion.unwrap_or(0),
            )),
        };

        Ok(ChatCompletion {
            content,
            model: body.model.unwrap_or_else(|| self.model.clone()),
            usage,
        })
    }
}

impl ChatModel for OllamaChat {
    fn complete(&self, messages: Vec<FormattedMessage>) -> LlmFuture<'_, LlmResult<ChatCompletion>> {
        Box::pin(async move {
            tracing::debug!(
                model = %self.model,
                messages = messages.len(),
                system = messages.iter().any(|m| m.role == Role::System),
                "Sending chat request"
            );
            self.post_chat(&messages).await
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let cases = [
            ("http://host:11434", "http://host:11434/api/chat"),
            ("http://host/ollama", "http://host/ollama/api/chat"),
            ("http://host/ollama/", "http://host/ollama/api/chat"),
        ];
        for (base, expected) in cases {
            assert_eq!(chat_endpoint(base).expect("valid url").as_str(), expected);
        }
        assert!(chat_endpoint("not a url").is_err());
    }

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: server.uri(),
            model: "test-model".to_string(),
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn sends_context_and_parses_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "stream": false,
                "messages": [{"role": "user", "content": "hello"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "test-model",
                "message": {"role": "assistant", "content": "hi there"},
                "done": true,
                "prompt_eval_count": 7,
                "eval_count": 3,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OllamaChat::new(&config_for(&server)).expect("client");
        let completion = client
            .complete(vec![FormattedMessage::new(Role::User, "hello")])
            .await
            .expect("completion");

        assert_eq!(completion.content, "hi there");
        assert_eq!(completion.model, "test-model");
        assert_eq!(completion.usage, Some(TokenUsage::new(7, 3)));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let client = OllamaChat::new(&config_for(&server)).expect("client");
        let err = client
            .complete(vec![FormattedMessage::new(Role::User, "hello")])
            .await
            .expect_err("status error");

        assert!(matches!(err, LlmError::Status { status: 404, ref body } if body == "model not found"));
    }

    #[tokio::test]
    async fn blank_reply_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "  "},
            })))
            .mount(&server)
            .await;

        let client = OllamaChat::new(&config_for(&server)).expect("client");
        let err = client
            .complete(vec![FormattedMessage::new(Role::User, "hello")])
            .await
            .expect_err("empty");
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let config = LlmConfig {
            base_url: "not a url".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(OllamaChat::new(&config), Err(LlmError::InvalidUrl(_))));
    }
}
