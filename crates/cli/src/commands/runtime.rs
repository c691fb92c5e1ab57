//! Shared wiring: config, store, provider chain and orchestrator.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use supportline_config::AppConfig;
use supportline_core::store::SessionStore;
use supportline_engine::{FaqMatcher, FuzzyFaqMatcher, Orchestrator, load_faqs};
use supportline_store::{InMemorySessionStore, SqliteSessionStore};
use tracing::{debug, info, warn};

/// Load config from `path`, or from `~/.supportline/config.toml`.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => AppConfig::load().context("Failed to load config"),
    }
}

/// Open the configured session store.
pub async fn build_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>> {
    match config.store.backend.as_str() {
        "memory" => {
            let mut store = InMemorySessionStore::new();
            if let Some(max) = config.store.max_sessions {
                store = store.with_max_sessions(max);
            }
            Ok(Arc::new(store))
        }
        "sqlite" => {
            let path = config.store.file_path();
            if let Some(parent) = path
                .as_deref()
                .and_then(Path::parent)
                .filter(|p| !p.as_os_str().is_empty())
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            if config.store.max_sessions.is_some() {
                warn!("store.max_sessions only applies to the memory backend");
            }
            let store = SqliteSessionStore::new(&config.store.path)
                .await
                .with_context(|| format!("Failed to open session store at {}", config.store.path))?;
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("Unknown store backend '{other}' (expected 'sqlite' or 'memory')"),
    }
}

/// Load the FAQ table named in the config.
pub fn build_matcher(config: &AppConfig) -> Result<FuzzyFaqMatcher> {
    let entries = load_faqs(Path::new(&config.faq.path))?;
    Ok(FuzzyFaqMatcher::new(entries, config.faq.threshold))
}

/// Build the orchestrator with every dependency from the config.
pub async fn build_orchestrator(config: &AppConfig) -> Result<Arc<Orchestrator>> {
    if !config.has_api_key() {
        warn!("No API key configured; generated answers will degrade");
    }

    let store = build_store(config).await?;
    let matcher = build_matcher(config)?;

    // Each chain entry gets an equal share of the overall provider budget
    let router = supportline_providers::build_from_config(config);
    let entries = 1 + config.fallback_providers.len() as u32;
    let total = Duration::from_secs(config.conversation.provider_timeout_secs);
    let provider = router.chain(total / entries);
    debug!(providers = ?router.list(), "Provider chain built");

    info!(
        store = store.name(),
        faq_entries = matcher.len(),
        provider = %config.default_provider,
        model = %config.default_model,
        "Support runtime ready"
    );

    Ok(Arc::new(Orchestrator::from_config(
        config,
        store,
        Arc::new(provider),
        Arc::new(matcher),
    )))
}
