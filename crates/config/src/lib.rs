//! Configuration loading, validation, and management for SupportLine.
//!
//! Loads configuration from `~/.supportline/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.supportline/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Generative fallback provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature for chat replies
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max tokens per chat reply
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Providers tried in order after the default one fails
    #[serde(default)]
    pub fallback_providers: Vec<String>,

    /// Session store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// FAQ table configuration
    #[serde(default)]
    pub faq: FaqConfig,

    /// Escalation heuristic tuning
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Conversation and prompt limits
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    256
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("fallback_providers", &self.fallback_providers)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .field("faq", &self.faq)
            .field("escalation", &self.escalation)
            .field("conversation", &self.conversation)
            .field("providers", &self.providers)
            .finish()
    }
}

/// Per-provider settings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `sqlite` or `memory`
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database path (ignored by the memory backend)
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Evict the oldest sessions beyond this count (memory backend only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}
fn default_store_path() -> String {
    AppConfig::config_dir()
        .join("sessions.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
            max_sessions: None,
        }
    }
}

impl StoreConfig {
    /// The database file on disk, with any `sqlite:` URL scheme and query
    /// string removed. `None` for in-memory databases.
    pub fn file_path(&self) -> Option<PathBuf> {
        let path = self.path.trim();
        let path = path
            .strip_prefix("sqlite://")
            .or_else(|| path.strip_prefix("sqlite:"))
            .unwrap_or(path);
        let path = path.split('?').next().unwrap_or_default();
        if path.is_empty() || path == ":memory:" {
            return None;
        }
        Some(PathBuf::from(path))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum accepted request body, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Browser origins allowed by CORS. Empty means same-origin only.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    5000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_body_bytes: default_max_body_bytes(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqConfig {
    /// JSON file with `[{question, answer, keywords?}]`
    #[serde(default = "default_faq_path")]
    pub path: String,

    /// Minimum similarity in `[0, 1]` for an FAQ answer to be used
    #[serde(default = "default_faq_threshold")]
    pub threshold: f32,
}

fn default_faq_path() -> String {
    AppConfig::config_dir()
        .join("faqs.json")
        .to_string_lossy()
        .into_owned()
}
fn default_faq_threshold() -> f32 {
    0.65
}

impl Default for FaqConfig {
    fn default() -> Self {
        Self {
            path: default_faq_path(),
            threshold: default_faq_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Words and phrases that mean "get me a human"
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,

    /// Generated answers whose text-estimated confidence falls below this
    /// are escalated
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Threshold for confidence reported by the provider itself. Providers
    /// report `exp(mean token logprob)`, which sits around 0.3 to 0.6 for
    /// ordinary multi-sentence answers; 0.2 corresponds to a mean logprob
    /// of about -1.6.
    #[serde(default = "default_provider_confidence_threshold")]
    pub provider_confidence_threshold: f32,

    /// Escalate after this many consecutive non-FAQ answers (0 disables)
    #[serde(default = "default_max_unresolved_turns")]
    pub max_unresolved_turns: usize,
}

fn default_markers() -> Vec<String> {
    [
        "human",
        "agent",
        "real person",
        "representative",
        "speak to someone",
        "talk to someone",
        "escalate",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_confidence_threshold() -> f32 {
    0.5
}
fn default_provider_confidence_threshold() -> f32 {
    0.2
}
fn default_max_unresolved_turns() -> usize {
    4
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            markers: default_markers(),
            confidence_threshold: default_confidence_threshold(),
            provider_confidence_threshold: default_provider_confidence_threshold(),
            max_unresolved_turns: default_max_unresolved_turns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Name the assistant uses in prompts
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,

    /// Turns of history sent to the provider
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,

    /// Longest accepted user message, in characters
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Upper bound on a single generative call
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Turns considered when summarizing very long sessions
    #[serde(default = "default_summary_window_turns")]
    pub summary_window_turns: usize,
}

fn default_assistant_name() -> String {
    "Clara".into()
}
fn default_context_turns() -> usize {
    10
}
fn default_max_message_chars() -> usize {
    2000
}
fn default_provider_timeout_secs() -> u64 {
    20
}
fn default_summary_window_turns() -> usize {
    200
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            context_turns: default_context_turns(),
            max_message_chars: default_max_message_chars(),
            provider_timeout_secs: default_provider_timeout_secs(),
            summary_window_turns: default_summary_window_turns(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Also checks environment variables:
    /// - `SUPPORTLINE_API_KEY` (highest priority), `GEMINI_API_KEY`, `OPENAI_API_KEY`
    /// - `SUPPORTLINE_PROVIDER`, `SUPPORTLINE_MODEL`
    /// - `DATABASE_URL` for the SQLite store path
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Takes a lookup function rather than reading the process environment
    /// directly so tests can supply their own variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("SUPPORTLINE_API_KEY")
                .or_else(|| lookup("GEMINI_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("SUPPORTLINE_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("SUPPORTLINE_MODEL") {
            self.default_model = model;
        }

        if let Some(url) = lookup("DATABASE_URL") {
            self.store.path = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".supportline")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.faq.threshold) {
            return Err(ConfigError::ValidationError(
                "faq.threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.escalation.confidence_threshold) {
            return Err(ConfigError::ValidationError(
                "escalation.confidence_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.escalation.provider_confidence_threshold) {
            return Err(ConfigError::ValidationError(
                "escalation.provider_confidence_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if self.conversation.context_turns == 0 {
            return Err(ConfigError::ValidationError(
                "conversation.context_turns must be > 0".into(),
            ));
        }

        if self.conversation.max_message_chars == 0 {
            return Err(ConfigError::ValidationError(
                "conversation.max_message_chars must be > 0".into(),
            ));
        }

        if self.conversation.provider_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "conversation.provider_timeout_secs must be > 0".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be 'sqlite' or 'memory', got '{}'",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some() || self.providers.values().any(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            fallback_providers: Vec::new(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
            faq: FaqConfig::default(),
            escalation: EscalationConfig::default(),
            conversation: ConversationConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
