//! Ordered provider chain.
//!
//! Providers are tried in registration order and the first one whose
//! response survives the caller's parse step wins. A parse failure counts
//! as a provider failure, so a model that answers with prose instead of
//! JSON hands over to the next provider just like a network error would.

use std::sync::Arc;

use crate::error::{LlmError, LlmResult};
use crate::provider::{AIMessage, AIProvider, AIResponse, GenerateOptions};

/// One provider plus the model it should be asked for.
#[derive(Clone)]
struct ChainEntry {
    provider: Arc<dyn AIProvider>,
    model: String,
}

/// Successful chain result.
#[derive(Debug)]
pub struct ChainOutput<T> {
    /// Parsed value.
    pub value: T,
    /// Provider that produced it.
    pub provider: &'static str,
    /// Model that produced it.
    pub model: String,
    /// Zero-based position of the provider in the chain.
    pub position: usize,
}

/// Primary/fallback list of text providers.
#[derive(Clone, Default)]
pub struct ProviderChain {
    entries: Vec<ChainEntry>,
}

impl ProviderChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider. Unconfigured providers are skipped.
    pub fn with(mut self, provider: Arc<dyn AIProvider>, model: impl Into<String>) -> Self {
        self.push(provider, model);
        self
    }

    /// Append a provider in place. Unconfigured providers are skipped.
    pub fn push(&mut self, provider: Arc<dyn AIProvider>, model: impl Into<String>) {
        let model = model.into();

        if !provider.is_configured() {
            tracing::debug!(
                provider = provider.name(),
                env_var = provider.api_key_env_var(),
                "Provider not configured, leaving it out of the chain"
            );
            return;
        }

        if !provider.supports_model(&model) {
            tracing::warn!(
                provider = provider.name(),
                model = %model,
                "Model is not in the provider's known list, sending it anyway"
            );
        }

        self.entries.push(ChainEntry { provider, model });
    }

    /// Number of providers in the chain.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the chain has no providers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Provider names in order.
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.provider.name()).collect()
    }

    /// Generate with each provider in turn until `parse` accepts a response.
    pub async fn generate_with<T, F>(
        &self,
        messages: &[AIMessage],
        options: &GenerateOptions,
        mut parse: F,
    ) -> LlmResult<ChainOutput<T>>
    where
        F: FnMut(&AIResponse) -> LlmResult<T> + Send,
        T: Send,
    {
        if self.entries.is_empty() {
            return Err(LlmError::Exhausted("no configured providers".to_string()));
        }

        let mut failures = Vec::with_capacity(self.entries.len());

        for (position, entry) in self.entries.iter().enumerate() {
            let name = entry.provider.name();
            let attempt = entry
                .provider
                .generate_text(&entry.model, messages, options)
                .await
                .and_then(|response| parse(&response));

            match attempt {
                Ok(value) => {
                    if position > 0 {
                        tracing::info!(provider = name, position, "Fallback provider succeeded");
                    }
                    return Ok(ChainOutput {
                        value,
                        provider: name,
                        model: entry.model.clone(),
                        position,
                    });
                }
                Err(e) => {
                    tracing::warn!(provider = name, model = %entry.model, error = %e, "Provider failed");
                    failures.push(format!("{name}: {e}"));
                }
            }
        }

        Err(LlmError::Exhausted(failures.join("; ")))
    }
}
