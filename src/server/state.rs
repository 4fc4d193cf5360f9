//! Application state shared across all request handlers.

use std::sync::Arc;

use tracing::info;

use crate::config::RelayConfig;
use crate::conversation::backend::{InMemoryBackend, KeyValueBackend, RedisBackend};
use crate::conversation::store::ConversationStore;
use crate::llm::{ChatModel, OllamaChat};

/// Shared application state.
pub struct AppState {
    /// Conversation store.
    pub store: Arc<ConversationStore>,
    /// Model client used for chat completions.
    pub model: Arc<dyn ChatModel>,
    /// System prompt prepended when a session carries none.
    pub system_prompt: Option<String>,
}

impl AppState {
    /// Assemble state from already constructed parts.
    #[must_use]
    pub fn new(
        store: Arc<ConversationStore>,
        model: Arc<dyn ChatModel>,
        system_prompt: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            model,
            system_prompt,
        })
    }

    /// Build the backend, store and model client described by `config`.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be reached or a client cannot be built.
    pub async fn from_config(
        config: &RelayConfig,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let backend: Arc<dyn KeyValueBackend> = match &config.backend.redis_url {
            Some(url) => Arc::new(RedisBackend::connect(url).await?),
            None => {
                info!("No redis URL configured, sessions are kept in memory");
                Arc::new(InMemoryBackend::default())
            }
        };

        let store = Arc::new(ConversationStore::new(backend, config.store.clone())?);
        let model = Arc::new(
            OllamaChat::new(&config.llm).map_err(|e| format!("Failed to create model client: {e}"))?,
        );

        Ok(Self::new(store, model, config.llm.system_prompt.clone()))
    }
}
