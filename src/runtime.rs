//! Process-scoped runtime handle.
//!
//! The teacher relies on a single global: the lazily-initialized shared `reqwest::Client`.
//! This runtime carves out the same single exception (§9's "Global mutable state" note) and
//! otherwise threads everything — configuration, the LLM client, endpoint health — through
//! one `Runtime` value that callers construct explicitly and pass down, rather than reaching
//! for statics.

use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::llm::client::{shared_http_client, HttpLlmClient, LlmClientConfig};
use crate::llm::LlmClient;

/// Owns everything a running task needs that should be shared rather than rebuilt per call:
/// the configuration, the LLM client (with its endpoint pool), and the pooled HTTP client.
pub struct Runtime {
    config: RuntimeConfig,
    llm: Arc<dyn LlmClient>,
    /// Keeps the spawned health-probe task alive for as long as this `Runtime` is; dropping
    /// the `Runtime` stops probing. `None` when constructed via `with_llm_client`, which
    /// bypasses `HttpLlmClient` entirely and so has no endpoint pool to probe.
    _health_probe: Option<tokio::task::JoinHandle<()>>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        let llm_config = LlmClientConfig {
            endpoints: config.llm.endpoints.clone(),
            model: config.llm.model.clone(),
            api_key: config.llm.api_key.clone(),
            max_retries: config.llm.max_retries,
            request_timeout: config.llm.request_timeout(),
            mode: config.llm.mode,
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            top_p: config.llm.top_p,
        };
        let http_client = Arc::new(HttpLlmClient::with_http_client(
            llm_config,
            shared_http_client().clone(),
        ));
        let health_probe = Arc::clone(&http_client).spawn_health_probe(config.llm.health_check_interval());
        Self { config, llm: http_client, _health_probe: Some(health_probe) }
    }

    /// Construct a `Runtime` with an explicit `LlmClient`, bypassing `HttpLlmClient` — used
    /// by tests that need a stub client.
    pub fn with_llm_client(config: RuntimeConfig, llm: Arc<dyn LlmClient>) -> Self {
        Self { config, llm, _health_probe: None }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn llm(&self) -> &dyn LlmClient {
        self.llm.as_ref()
    }

    pub fn llm_arc(&self) -> Arc<dyn LlmClient> {
        Arc::clone(&self.llm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_runtime_uses_configured_model() {
        let runtime = Runtime::new(RuntimeConfig::default());
        assert_eq!(runtime.config().llm.model, "local-model");
    }
}
