//! Named chat endpoints and the default one sessions talk to.
//!
//! Every endpoint speaks the OpenAI chat-completions protocol; names only
//! select a base URL and key. Sessions use the default entry.

use crate::openai_compat::OpenAiCompatProvider;
use assay_config::AppConfig;
use assay_core::provider::Provider;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Well-known OpenAI-compatible endpoints.
const KNOWN_ENDPOINTS: &[(&str, &str)] = &[
    ("openai", "https://api.openai.com/v1"),
    ("openrouter", "https://openrouter.ai/api/v1"),
    ("ollama", "http://localhost:11434/v1"),
    ("vllm", "http://localhost:8000/v1"),
    ("groq", "https://api.groq.com/openai/v1"),
    ("deepseek", "https://api.deepseek.com/v1"),
    ("together", "https://api.together.xyz/v1"),
];

/// Base URL for a well-known endpoint name.
pub fn known_endpoint(name: &str) -> Option<&'static str> {
    KNOWN_ENDPOINTS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, url)| *url)
}

/// Named providers plus the one sessions use by default.
pub struct ProviderRouter {
    providers: BTreeMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: BTreeMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register (or replace) a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.get(&self.default_provider)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn default_name(&self) -> &str {
        &self.default_provider
    }
}

/// Register every `[providers.*]` entry, then the default provider if it
/// was not configured explicitly. Keys fall back to the top-level
/// `api_key`.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, entry) in &config.providers {
        let Some(base_url) = entry.api_url.as_deref().or_else(|| known_endpoint(name)) else {
            tracing::warn!(provider = %name, "No api_url and not a known endpoint, skipping");
            continue;
        };
        let api_key = entry.api_key.as_deref().or(config.api_key.as_deref());
        router.register(
            name.clone(),
            Arc::new(OpenAiCompatProvider::new(name, base_url, api_key.unwrap_or_default())),
        );
    }

    if router.default().is_none() {
        match known_endpoint(&config.default_provider) {
            Some(base_url) => router.register(
                config.default_provider.clone(),
                Arc::new(OpenAiCompatProvider::new(
                    &config.default_provider,
                    base_url,
                    config.api_key.as_deref().unwrap_or_default(),
                )),
            ),
            None => tracing::warn!(
                provider = %config.default_provider,
                "Default provider has no [providers] entry and no known endpoint"
            ),
        }
    }

    router
}

/// The model sessions request: the default provider's own model, else the
/// top-level one.
pub fn default_model(config: &AppConfig) -> String {
    config
        .providers
        .get(&config.default_provider)
        .and_then(|p| p.default_model.clone())
        .unwrap_or_else(|| config.default_model.clone())
}
