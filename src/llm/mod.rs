//! Language-model client abstraction.

/// Model client errors.
pub mod error;
/// Ollama `/api/chat` client.
pub mod ollama_chat;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::conversation::core::message::FormattedMessage;

pub use error::{LlmError, LlmResult};
pub use ollama_chat::OllamaChat;

/// Boxed future type for model calls.
pub type LlmFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Token accounting reported by the model API.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u64,
    /// Tokens generated in the reply.
    pub completion_tokens: u64,
    /// Sum of both.
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build usage from prompt and completion counts.
    #[must_use]
    pub const fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// A model reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatCompletion {
    /// Reply text.
    pub content: String,
    /// Model that produced the reply.
    pub model: String,
    /// Token usage, when reported.
    pub usage: Option<TokenUsage>,
}

/// Chat-capable language model.
pub trait ChatModel: Send + Sync {
    /// Generate the next assistant turn for `messages`.
    ///
    /// # Errors
    /// Returns an error if the request fails or the reply is empty.
    fn complete(&self, messages: Vec<FormattedMessage>) -> LlmFuture<'_, LlmResult<ChatCompletion>>;

    /// Name of the configured model.
    fn model_name(&self) -> &str;
}
