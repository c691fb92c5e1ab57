//! Provider router: selects the completion provider based on config.
//!
//! Handles provider creation and builds the fallback chain the
//! orchestrator talks to.

use crate::fallback::FallbackProvider;
use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use supportline_config::AppConfig;
use supportline_core::provider::Provider;
use tracing::debug;

/// Routes completion requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    models: HashMap<String, String>,
    default_provider: String,
    fallbacks: Vec<String>,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            models: HashMap::new(),
            default_provider: default_provider.into(),
            fallbacks: Vec::new(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Pin the model a provider is asked for, overriding the request's.
    pub fn set_model(&mut self, name: impl Into<String>, model: impl Into<String>) {
        self.models.insert(name.into(), model.into());
    }

    /// The model pinned for a provider, if any.
    pub fn model_for(&self, name: &str) -> Option<&str> {
        self.models.get(name).map(String::as_str)
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    /// Build the chain: default provider first, then configured fallbacks
    /// in order. Unknown names are skipped.
    pub fn chain(&self, per_provider_timeout: Duration) -> FallbackProvider {
        let mut chain = FallbackProvider::new("supportline");
        let mut seen: Vec<&str> = Vec::new();

        for name in std::iter::once(&self.default_provider).chain(self.fallbacks.iter()) {
            if seen.contains(&name.as_str()) {
                continue;
            }
            if let Some(provider) = self.providers.get(name) {
                chain = chain.add_with_model(
                    provider.clone(),
                    per_provider_timeout,
                    self.models.get(name).cloned(),
                );
                seen.push(name);
            } else {
                debug!(provider = %name, "Skipping unregistered fallback provider");
            }
        }

        chain
    }
}

/// Build providers from configuration.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);
    router.fallbacks = config.fallback_providers.clone();

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let provider = create_provider(name, &api_key, provider_config.api_url.as_deref());
        router.register(name.clone(), provider);
        if let Some(model) = &provider_config.default_model {
            router.set_model(name.clone(), model.clone());
        }
    }

    // Default and fallback providers exist even when not explicitly configured
    let implicit: Vec<String> = std::iter::once(config.default_provider.clone())
        .chain(config.fallback_providers.iter().cloned())
        .collect();
    for name in implicit {
        if router.get(&name).is_none() {
            let api_key = config.api_key.clone().unwrap_or_default();
            let provider = create_provider(&name, &api_key, None);
            router.register(name, provider);
        }
    }

    router
}

fn create_provider(name: &str, api_key: &str, api_url: Option<&str>) -> Arc<dyn Provider> {
    match name {
        "gemini" => {
            let mut p = GeminiProvider::new(api_key);
            if let Some(url) = api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        "openai" => {
            let base_url = api_url.map(String::from).unwrap_or_else(|| default_base_url(name));
            Arc::new(OpenAiCompatProvider::new(name, base_url, api_key).with_logprobs(true))
        }
        _ => {
            let base_url = api_url.map(String::from).unwrap_or_else(|| default_base_url(name));
            Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
        }
    }
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "gemini" => "https://generativelanguage.googleapis.com/v1beta".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
