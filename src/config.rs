//! Service configuration loaded from the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::conversation::core::config::StoreConfig;
use crate::conversation::maintenance::CleanupConfig;

/// Prefix shared by every configuration variable.
pub const ENV_PREFIX: &str = "CHAT_RELAY_";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default model API endpoint.
pub const DEFAULT_LLM_URL: &str = "http://127.0.0.1:11434";

/// Default model name.
pub const DEFAULT_MODEL: &str = "llama3.1:8b";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds an unparsable value.
    #[error("invalid value for {name}: {value:?}")]
    InvalidVar {
        /// Variable name.
        name: String,
        /// Raw value.
        value: String,
    },
    /// A parsed value violates an invariant.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// URL parse error.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// Convenience result alias for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration for the relay.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Conversation store settings.
    pub store: StoreConfig,
    /// Backend selection.
    pub backend: BackendConfig,
    /// Model API settings.
    pub llm: LlmConfig,
    /// Background cleanup settings.
    pub cleanup: CleanupConfig,
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    pub host: IpAddr,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Socket address to bind.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Backend selection.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Redis URL; the in-memory backend is used when unset.
    pub redis_url: Option<String>,
}

/// Model API settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the Ollama-compatible API.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Optional cap on generated tokens.
    pub max_tokens: Option<u32>,
    /// How long the server keeps the model loaded.
    pub keep_alive: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// System prompt prepended to sessions without one.
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: None,
            keep_alive: "5m".to_string(),
            timeout_seconds: 120,
            system_prompt: None,
        }
    }
}

impl RelayConfig {
    /// Load configuration from `CHAT_RELAY_*` environment variables.
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        let mut config = Self::default();

        if let Some(host) = vars.parse("HOST")? {
            config.server.host = host;
        }
        if let Some(port) = vars.parse("PORT")? {
            config.server.port = port;
        }

        config.backend.redis_url = vars.string("REDIS_URL");

        if let Some(prefix) = vars.string("KEY_PREFIX") {
            config.store.key_prefix = prefix;
        }
        if let Some(ttl) = vars.parse("SESSION_TTL_SECS")? {
            config.store.session_ttl_seconds = ttl;
        }
        if let Some(limit) = vars.parse("HISTORY_LIMIT")? {
            config.store.history_limit = limit;
        }

        if let Some(url) = vars.string("LLM_URL") {
            config.llm.base_url = url;
        }
        if let Some(model) = vars.string("MODEL") {
            config.llm.model = model;
        }
        if let Some(temperature) = vars.parse("TEMPERATURE")? {
            config.llm.temperature = temperature;
        }
        config.llm.max_tokens = vars.parse("MAX_TOKENS")?;
        config.llm.system_prompt = vars.string("SYSTEM_PROMPT");

        if let Some(interval) = vars.parse("CLEANUP_INTERVAL_SECS")? {
            config.cleanup.interval_seconds = interval;
        }
        if let Some(max_age) = vars.parse("CLEANUP_MAX_AGE_SECS")? {
            config.cleanup.max_age_seconds = max_age;
        }
        if let Some(enabled) = vars.parse("CLEANUP_ENABLED")? {
            config.cleanup.enabled = enabled;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        self.store
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;

        if self.cleanup.interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "cleanup.interval_seconds must be > 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(
                "llm.temperature must be within [0, 2]".to_string(),
            ));
        }

        if self.llm.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "llm.timeout_seconds must be > 0".to_string(),
            ));
        }

        Url::parse(&self.llm.base_url)?;

        if let Some(redis_url) = &self.backend.redis_url {
            Url::parse(redis_url)?;
        }

        Ok(())
    }
}

/// Prefixed, trimmed environment lookups.
struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{name}"))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: FromStr>(&self, name: &str) -> ConfigResult<Option<T>> {
        self.string(name)
            .map(|value| {
                value.parse().map_err(|_| ConfigError::InvalidVar {
                    name: format!("{ENV_PREFIX}{name}"),
                    value,
                })
            })
            .transpose()
    }
}
