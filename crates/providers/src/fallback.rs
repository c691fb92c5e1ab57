//! Provider fallback: ordered retry chain with per-provider timeouts.
//!
//! When a provider fails (timeout, rate limit, error, empty answer), the next
//! provider in the configured chain is tried. The provider that finally
//! answered is recorded in the response metadata under `served_by`.
//!
//! An entry may pin its own model; the request's model is then replaced
//! before that entry is called.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use supportline_core::error::ProviderError;
use supportline_core::provider::*;
use tracing::{info, warn};

const DEFAULT_ENTRY_TIMEOUT: Duration = Duration::from_secs(30);

/// A provider that wraps an ordered list of providers and falls back on failure.
pub struct FallbackProvider {
    name: String,
    chain: Vec<FallbackEntry>,
}

/// A single entry in the fallback chain.
struct FallbackEntry {
    provider: Arc<dyn Provider>,
    timeout: Duration,
    model: Option<String>,
}

impl FallbackProvider {
    /// Create a new fallback provider with no entries.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: Vec::new(),
        }
    }

    /// Add a provider to the fallback chain with a custom timeout.
    pub fn add(self, provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        self.add_with_model(provider, timeout, None)
    }

    /// Add a provider that always answers with `model`, whatever the
    /// request asked for.
    pub fn add_with_model(
        mut self,
        provider: Arc<dyn Provider>,
        timeout: Duration,
        model: Option<String>,
    ) -> Self {
        self.chain.push(FallbackEntry {
            provider,
            timeout,
            model,
        });
        self
    }

    /// Add a provider with the default timeout (30s).
    pub fn add_default(self, provider: Arc<dyn Provider>) -> Self {
        self.add(provider, DEFAULT_ENTRY_TIMEOUT)
    }

    /// Number of providers in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Names of the chained providers, in order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.chain.iter().map(|e| e.provider.name()).collect()
    }
}

#[async_trait]
impl Provider for FallbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut last_error = ProviderError::NotConfigured("No providers in fallback chain".into());

        for (i, entry) in self.chain.iter().enumerate() {
            let provider_name = entry.provider.name().to_string();
            let mut attempt = request.clone();
            if let Some(model) = &entry.model {
                attempt.model = model.clone();
            }

            info!(
                provider = %provider_name,
                model = %attempt.model,
                attempt = i + 1,
                total = self.chain.len(),
                "Fallback: trying provider"
            );

            match tokio::time::timeout(entry.timeout, entry.provider.complete(attempt)).await
            {
                Ok(Ok(response)) if response.message.content.trim().is_empty() => {
                    warn!(provider = %provider_name, "Fallback: provider returned an empty answer, trying next");
                    last_error = ProviderError::MalformedResponse(format!(
                        "Provider '{provider_name}' returned an empty answer"
                    ));
                }
                Ok(Ok(mut response)) => {
                    response
                        .metadata
                        .insert("served_by".into(), serde_json::json!(provider_name));
                    return Ok(response);
                }
                Ok(Err(e)) => {
                    warn!(
                        provider = %provider_name,
                        error = %e,
                        "Fallback: provider failed, trying next"
                    );
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        provider = %provider_name,
                        timeout_ms = entry.timeout.as_millis() as u64,
                        "Fallback: provider timed out, trying next"
                    );
                    last_error = ProviderError::Timeout(format!(
                        "Provider '{}' timed out after {}ms",
                        provider_name,
                        entry.timeout.as_millis()
                    ));
                }
            }
        }

        Err(last_error)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let mut all_models = Vec::new();
        for entry in &self.chain {
            if let Ok(models) = entry.provider.list_models().await {
                all_models.extend(models);
            }
        }
        Ok(all_models)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        for entry in &self.chain {
            if let Ok(true) = entry.provider.health_check().await {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use supportline_core::message::Message;

    /// A mock provider that always fails.
    struct FailingProvider {
        name: String,
        error: ProviderError,
        call_count: Mutex<usize>,
    }

    impl FailingProvider {
        fn new(name: &str, error: ProviderError) -> Self {
            Self {
                name: name.into(),
                error,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Err(self.error.clone())
        }
    }

    /// A mock provider that answers with fixed text.
    struct TextProvider {
        name: String,
        text: String,
        call_count: Mutex<usize>,
    }

    impl TextProvider {
        fn new(name: &str, text: &str) -> Self {
            Self {
                name: name.into(),
                text: text.into(),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for TextProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Ok(ProviderResponse::text("test-model", self.text.clone()))
        }
    }

    /// Answers with the model it was asked for.
    struct EchoModelProvider {
        name: String,
        seen: Mutex<Vec<String>>,
    }

    impl EchoModelProvider {
        fn new(name: &str) -> Self {
            Self {
                name: name.into(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Provider for EchoModelProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            self.seen.lock().unwrap().push(request.model.clone());
            Ok(ProviderResponse::text(request.model.clone(), "Answered."))
        }
    }

    /// A mock provider that hangs forever (for timeout testing).
    struct HangingProvider;

    #[async_trait]
    impl Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::Timeout("unreachable".into()))
        }
    }

    fn test_request() -> ProviderRequest {
        ProviderRequest::new("test", vec![Message::user("What are your hours?")])
    }

    #[tokio::test]
    async fn first_provider_answers() {
        let p1 = Arc::new(TextProvider::new("primary", "We open at nine."));
        let p2 = Arc::new(TextProvider::new("secondary", "unused"));

        let fallback = FallbackProvider::new("chain")
            .add_default(p1.clone())
            .add_default(p2.clone());

        let response = fallback.complete(test_request()).await.unwrap();
        assert_eq!(response.message.content, "We open at nine.");
        assert_eq!(response.metadata["served_by"], "primary");

        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 0);
    }

    #[tokio::test]
    async fn falls_back_on_api_error() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::ApiError {
                status_code: 500,
                message: "Internal Server Error".into(),
            },
        ));
        let p2 = Arc::new(TextProvider::new("secondary", "Backup answer."));

        let fallback = FallbackProvider::new("chain")
            .add_default(p1.clone())
            .add_default(p2.clone());

        let response = fallback.complete(test_request()).await.unwrap();
        assert_eq!(response.metadata["served_by"], "secondary");
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn empty_answer_counts_as_failure() {
        let p1 = Arc::new(TextProvider::new("blank", "   "));
        let p2 = Arc::new(TextProvider::new("secondary", "Real answer."));

        let fallback = FallbackProvider::new("chain")
            .add_default(p1.clone())
            .add_default(p2.clone());

        let response = fallback.complete(test_request()).await.unwrap();
        assert_eq!(response.message.content, "Real answer.");
        assert_eq!(p1.calls(), 1);
    }

    #[tokio::test]
    async fn all_providers_fail_returns_last_error() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::Network("conn refused".into()),
        ));
        let p2 = Arc::new(FailingProvider::new(
            "secondary",
            ProviderError::RateLimited {
                retry_after_secs: 5,
            },
        ));

        let fallback = FallbackProvider::new("chain")
            .add_default(p1.clone())
            .add_default(p2.clone());

        match fallback.complete(test_request()).await.unwrap_err() {
            ProviderError::RateLimited { .. } => {}
            other => panic!("Expected RateLimited, got: {other:?}"),
        }
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn fallback_entry_uses_its_own_model() {
        let p1 = Arc::new(FailingProvider::new(
            "gemini",
            ProviderError::Network("conn refused".into()),
        ));
        let p2 = Arc::new(EchoModelProvider::new("openai"));

        let fallback = FallbackProvider::new("chain")
            .add_default(p1.clone())
            .add_with_model(p2.clone(), Duration::from_secs(1), Some("gpt-4o-mini".into()));

        let request = ProviderRequest::new("gemini-1.5-flash", vec![Message::user("Hi")]);
        let response = fallback.complete(request).await.unwrap();
        assert_eq!(response.metadata["served_by"], "openai");
        assert_eq!(*p2.seen.lock().unwrap(), vec!["gpt-4o-mini".to_string()]);
    }

    #[tokio::test]
    async fn entry_without_model_keeps_requested_one() {
        let p1 = Arc::new(EchoModelProvider::new("gemini"));
        let fallback = FallbackProvider::new("chain").add_with_model(
            p1.clone(),
            Duration::from_secs(1),
            None,
        );

        let request = ProviderRequest::new("gemini-1.5-flash", vec![Message::user("Hi")]);
        fallback.complete(request).await.unwrap();
        assert_eq!(*p1.seen.lock().unwrap(), vec!["gemini-1.5-flash".to_string()]);
    }

    #[tokio::test]
    async fn timeout_triggers_fallback() {
        let p2 = Arc::new(TextProvider::new("secondary", "After timeout."));

        let fallback = FallbackProvider::new("chain")
            .add(Arc::new(HangingProvider), Duration::from_millis(50))
            .add_default(p2.clone());

        let response = fallback.complete(test_request()).await.unwrap();
        assert_eq!(response.message.content, "After timeout.");
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn lone_hanging_provider_times_out() {
        let fallback =
            FallbackProvider::new("chain").add(Arc::new(HangingProvider), Duration::from_millis(20));
        assert!(matches!(
            fallback.complete(test_request()).await,
            Err(ProviderError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn empty_chain_returns_not_configured() {
        let fallback = FallbackProvider::new("empty");
        assert!(fallback.is_empty());
        assert!(matches!(
            fallback.complete(test_request()).await,
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn health_check_any_healthy() {
        let p1 = Arc::new(FailingProvider::new(
            "bad",
            ProviderError::Network("down".into()),
        ));
        let p2 = Arc::new(TextProvider::new("good", "ok"));

        let fallback = FallbackProvider::new("chain").add_default(p1).add_default(p2);

        assert_eq!(fallback.provider_names(), vec!["bad", "good"]);
        assert!(fallback.health_check().await.unwrap());
    }
}
