//! Dual-endpoint, OpenAI-compatible chat completion client with health-based failover.
//!
//! The teacher keeps one process-wide pooled `reqwest::Client` behind a `lazy_static`. This
//! runtime threads that client through the process-scoped `Runtime` handle instead (see
//! `crate::runtime`), which is the one deliberate structural departure from the teacher
//! noted in the design ledger — everything else about the pool tuning (idle timeout, max
//! idle per host, keepalive) is carried over unchanged.

use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::AgenticError;

use super::endpoint::{EndpointMode, EndpointPool};
use super::message::{Message, MessageChunk, Role};

/// A boxed stream of incremental completion chunks, mirroring the teacher's
/// `MessageChunkStream` return shape for `send_message_stream`.
pub type MessageChunkStream = Pin<Box<dyn Stream<Item = Result<MessageChunk, AgenticError>> + Send>>;

const RETRY_BACKOFFS_MS: [u64; 4] = [2000, 4000, 8000, 16000];

/// Build the shared, connection-pooled HTTP client. Tuning mirrors the teacher's
/// `SHARED_HTTP_CLIENT` constant.
pub fn build_shared_http_client() -> reqwest::Client {
    reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(300))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build shared HTTP client")
}

static SHARED_HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Borrow the lazily initialized process-wide HTTP client.
pub fn shared_http_client() -> &'static reqwest::Client {
    SHARED_HTTP_CLIENT.get_or_init(build_shared_http_client)
}

/// Configuration needed to talk to one or more OpenAI-compatible endpoints.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub endpoints: Vec<String>,
    pub model: String,
    pub api_key: String,
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub mode: EndpointMode,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub top_p: f64,
}

impl Default for LlmClientConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://localhost:8080".to_string()],
            model: "local-model".to_string(),
            api_key: "placeholder".to_string(),
            max_retries: 4,
            request_timeout: Duration::from_secs(120),
            mode: EndpointMode::ActiveActive,
            temperature: 0.7,
            max_tokens: None,
            top_p: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// When set, the client first tries a JSON-schema-constrained request and degrades to a
    /// prompt-appended JSON instruction if the endpoint rejects `response_format`.
    pub json_schema: Option<Value>,
}

/// What the dual-endpoint client surfaces to callers: the chosen assistant reply plus
/// whichever endpoint actually served it (useful for the engine's INFO-level logging
/// contract, which names the endpoint it used).
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub message: Message,
    pub endpoint: String,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<ChatReply, AgenticError>;

    /// Streams the completion as incremental `MessageChunk`s instead of waiting for the
    /// whole reply (spec §4.1's "Transport" note). The default falls back to `chat` and
    /// replays it as a single, already-finished chunk, so implementations that don't speak
    /// SSE (test stubs, `StubLlm`-style fakes) don't need to implement this separately.
    async fn chat_stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<MessageChunkStream, AgenticError> {
        let reply = self.chat(messages, options).await?;
        let chunk = MessageChunk { content: reply.message.content.to_string(), finish_reason: Some("stop".to_string()) };
        Ok(Box::pin(stream::once(async move { Ok(chunk) })))
    }
}

/// Reference `LlmClient` implementation: N configured OpenAI-compatible endpoints, selected
/// via `EndpointPool`, retried with exponential backoff across whichever endpoints remain
/// reachable.
pub struct HttpLlmClient {
    http: reqwest::Client,
    pool: EndpointPool,
    config: LlmClientConfig,
}

impl HttpLlmClient {
    pub fn new(config: LlmClientConfig) -> Self {
        let pool = EndpointPool::with_mode(config.endpoints.clone(), config.mode);
        Self {
            http: shared_http_client().clone(),
            pool,
            config,
        }
    }

    pub fn with_http_client(config: LlmClientConfig, http: reqwest::Client) -> Self {
        let pool = EndpointPool::with_mode(config.endpoints.clone(), config.mode);
        Self { http, pool, config }
    }

    pub fn endpoint_pool(&self) -> &EndpointPool {
        &self.pool
    }

    /// Spawns the periodic endpoint health probe named in spec §4.1/§5: every `interval`,
    /// hit each configured endpoint's `/v1/models` and record the result with the same
    /// `EndpointPool` bookkeeping a real chat request would, so an endpoint that recovers
    /// (or degrades) between tasks is reflected before the next `chat` call has to find out
    /// the hard way. Requires `self` behind an `Arc` since the probe outlives any one call.
    pub fn spawn_health_probe(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if interval.is_zero() {
                return; // probing disabled
            }
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; the endpoints are already fresh.
            loop {
                ticker.tick().await;
                self.probe_all_endpoints().await;
            }
        })
    }

    async fn probe_all_endpoints(&self) {
        for endpoint in self.config.endpoints.clone() {
            let url = format!("{}/v1/models", endpoint.trim_end_matches('/'));
            let started = Instant::now();
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.config.api_key)
                .timeout(Duration::from_secs(10))
                .send()
                .await;

            match response {
                Ok(r) if r.status().is_success() => {
                    self.pool.record_success(&endpoint, started.elapsed().as_secs_f64() * 1000.0);
                }
                Ok(r) => {
                    if log::log_enabled!(log::Level::Warn) {
                        log::warn!("health probe: {} returned HTTP {}", endpoint, r.status());
                    }
                    self.pool.record_failure(&endpoint);
                }
                Err(e) => {
                    if log::log_enabled!(log::Level::Warn) {
                        log::warn!("health probe: {} unreachable: {}", endpoint, e);
                    }
                    self.pool.record_failure(&endpoint);
                }
            }
        }
    }

    fn request_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    async fn try_once(
        &self,
        endpoint: &str,
        messages: &[Message],
        options: &ChatOptions,
        request_id: &str,
    ) -> Result<Message, AgenticError> {
        let url = format!("{}/v1/chat/completions", endpoint.trim_end_matches('/'));

        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content.as_ref(),
                })
            })
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": wire_messages,
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
        });
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(schema) = &options.json_schema {
            body["response_format"] = json!({"type": "json_schema", "json_schema": schema});
        }

        if log::log_enabled!(log::Level::Info) {
            let preview = messages
                .last()
                .map(|m| m.preview(500))
                .unwrap_or_default();
            log::info!(
                "[{}] -> {} model={} prompt_preview={:?}",
                request_id,
                endpoint,
                self.config.model,
                preview
            );
        }

        let started = Instant::now();
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .timeout(self.config.request_timeout)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                self.pool.record_failure(endpoint);
                return Err(AgenticError::LLMUnavailable {
                    detail: format!("{}: transport error: {}", endpoint, e),
                });
            }
        };

        if !response.status().is_success() {
            self.pool.record_failure(endpoint);
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AgenticError::LLMUnavailable {
                detail: format!("{}: HTTP {}: {}", endpoint, status, text),
            });
        }

        let parsed: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                self.pool.record_failure(endpoint);
                return Err(AgenticError::LLMInvalidResponse {
                    detail: format!("response body was not valid JSON: {}", e),
                });
            }
        };

        let content = parsed
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str());

        let content = match content {
            Some(c) => c,
            None => {
                self.pool.record_failure(endpoint);
                return Err(AgenticError::LLMInvalidResponse {
                    detail: "response had no choices[0].message.content".to_string(),
                });
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.pool.record_success(endpoint, elapsed_ms);

        if log::log_enabled!(log::Level::Info) {
            let msg = Message::assistant(content.to_string());
            log::info!(
                "[{}] <- {} ({}ms) response_preview={:?}",
                request_id,
                endpoint,
                elapsed_ms as u64,
                msg.preview(500)
            );
        }

        Ok(Message::assistant(content.to_string()))
    }

    /// Same request shape as `try_once`, but with `"stream": true` and no eager body read —
    /// the caller consumes the response as a byte stream instead.
    async fn try_once_stream(
        &self,
        endpoint: &str,
        messages: &[Message],
        options: &ChatOptions,
        request_id: &str,
    ) -> Result<reqwest::Response, AgenticError> {
        let url = format!("{}/v1/chat/completions", endpoint.trim_end_matches('/'));

        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content.as_ref(),
                })
            })
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": wire_messages,
            "stream": true,
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
        });
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(schema) = &options.json_schema {
            body["response_format"] = json!({"type": "json_schema", "json_schema": schema});
        }

        if log::log_enabled!(log::Level::Info) {
            log::info!("[{}] -> {} model={} (streaming)", request_id, endpoint, self.config.model);
        }

        let started = Instant::now();
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .timeout(self.config.request_timeout)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                self.pool.record_failure(endpoint);
                return Err(AgenticError::LLMUnavailable {
                    detail: format!("{}: transport error: {}", endpoint, e),
                });
            }
        };

        if !response.status().is_success() {
            self.pool.record_failure(endpoint);
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AgenticError::LLMUnavailable {
                detail: format!("{}: HTTP {}: {}", endpoint, status, text),
            });
        }

        self.pool.record_success(endpoint, started.elapsed().as_secs_f64() * 1000.0);
        Ok(response)
    }

    async fn chat_stream_impl(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<MessageChunkStream, AgenticError> {
        if messages.is_empty() {
            return Err(AgenticError::ValidationError {
                detail: "chat_stream() requires at least one message".to_string(),
            });
        }

        let request_id = Self::request_id();
        let mut tried: Vec<String> = Vec::new();
        let mut last_error: Option<AgenticError> = None;

        for attempt in 0..self.config.max_retries.max(1) {
            // If every reachable endpoint has already been excluded this request (the
            // single-endpoint case, or an N-endpoint pool with N < max_retries), cycle back
            // to the ones already tried rather than giving up early (spec §4.1: "cycling
            // when only one endpoint exists").
            let endpoint = match self.pool.select(&tried) {
                Some(e) => e,
                None => {
                    tried.clear();
                    match self.pool.select(&tried) {
                        Some(e) => e,
                        None => break,
                    }
                }
            };

            match self.try_once_stream(&endpoint, messages, options, &request_id).await {
                Ok(response) => {
                    let (tx, rx) = mpsc::channel(32);
                    tokio::spawn(drive_sse(response, tx));
                    return Ok(Box::pin(ReceiverStream::new(rx)));
                }
                Err(e) => {
                    if log::log_enabled!(log::Level::Warn) {
                        log::warn!("[{}] stream attempt {} against {} failed: {}", request_id, attempt, endpoint, e);
                    }
                    tried.push(endpoint);
                    last_error = Some(e);
                    if attempt + 1 < self.config.max_retries {
                        let backoff = RETRY_BACKOFFS_MS[(attempt as usize).min(RETRY_BACKOFFS_MS.len() - 1)];
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(AgenticError::LLMUnavailable {
            detail: "no endpoints configured".to_string(),
        }))
    }
}

/// Drives one streaming HTTP response to completion, parsing Server-Sent Events and
/// forwarding each decoded delta as a `MessageChunk`. Mirrors the node-event driver task in
/// `workflow::engine` — the channel closes naturally once this task returns, which is what
/// ends the `ReceiverStream` the caller holds.
async fn drive_sse(response: reqwest::Response, tx: mpsc::Sender<Result<MessageChunk, AgenticError>>) {
    let mut bytes = response.bytes_stream();
    let mut buffer = String::new();

    loop {
        match bytes.next().await {
            Some(Ok(bytes)) => {
                buffer.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].to_string();
                    buffer.drain(..=pos);
                    if let Some(chunk) = parse_sse_line(&line) {
                        let finished = chunk.finish_reason.is_some();
                        if tx.send(Ok(chunk)).await.is_err() || finished {
                            return;
                        }
                    }
                }
            }
            Some(Err(e)) => {
                let _ = tx.send(Err(AgenticError::LLMUnavailable { detail: format!("stream read error: {}", e) })).await;
                return;
            }
            None => return,
        }
    }
}

/// Parses one line of an OpenAI-compatible `text/event-stream` body. Returns `None` for
/// blank lines, non-`data:` lines, and deltas carrying neither content nor a finish reason.
fn parse_sse_line(line: &str) -> Option<MessageChunk> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(MessageChunk { content: String::new(), finish_reason: Some("stop".to_string()) });
    }

    let parsed: Value = serde_json::from_str(data).ok()?;
    let choice = parsed.get("choices")?.get(0)?;
    let content = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let finish_reason = choice.get("finish_reason").and_then(Value::as_str).map(str::to_string);

    if content.is_empty() && finish_reason.is_none() {
        return None;
    }
    Some(MessageChunk { content: content.to_string(), finish_reason })
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<ChatReply, AgenticError> {
        if messages.is_empty() {
            return Err(AgenticError::ValidationError {
                detail: "chat() requires at least one message".to_string(),
            });
        }

        let request_id = Self::request_id();
        let mut tried: Vec<String> = Vec::new();
        let mut last_error: Option<AgenticError> = None;

        for attempt in 0..self.config.max_retries.max(1) {
            // If every reachable endpoint has already been excluded this request (the
            // single-endpoint case, or an N-endpoint pool with N < max_retries), cycle back
            // to the ones already tried rather than giving up early (spec §4.1: "cycling
            // when only one endpoint exists").
            let endpoint = match self.pool.select(&tried) {
                Some(e) => e,
                None => {
                    tried.clear();
                    match self.pool.select(&tried) {
                        Some(e) => e,
                        None => break,
                    }
                }
            };

            match self.try_once(&endpoint, messages, options, &request_id).await {
                Ok(message) => return Ok(ChatReply { message, endpoint }),
                Err(e) => {
                    if log::log_enabled!(log::Level::Warn) {
                        log::warn!("[{}] attempt {} against {} failed: {}", request_id, attempt, endpoint, e);
                    }
                    tried.push(endpoint);
                    last_error = Some(e);
                    if attempt + 1 < self.config.max_retries {
                        let backoff = RETRY_BACKOFFS_MS[(attempt as usize).min(RETRY_BACKOFFS_MS.len() - 1)];
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(AgenticError::LLMUnavailable {
            detail: "no endpoints configured".to_string(),
        }))
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<MessageChunkStream, AgenticError> {
        self.chat_stream_impl(messages, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_one_endpoint() {
        let config = LlmClientConfig::default();
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.max_retries, 4);
    }

    #[tokio::test]
    async fn chat_rejects_empty_messages() {
        let client = HttpLlmClient::new(LlmClientConfig::default());
        let err = client.chat(&[], &ChatOptions::default()).await.unwrap_err();
        assert!(matches!(err, AgenticError::ValidationError { .. }));
    }

    #[test]
    fn parse_sse_line_extracts_delta_content() {
        let chunk = parse_sse_line("data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}").unwrap();
        assert_eq!(chunk.content, "hi");
        assert!(chunk.finish_reason.is_none());
    }

    #[test]
    fn parse_sse_line_done_marker_carries_stop_reason() {
        let chunk = parse_sse_line("data: [DONE]").unwrap();
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn parse_sse_line_ignores_non_data_lines() {
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("").is_none());
    }

    #[test]
    fn parse_sse_line_keeps_finish_reason_with_empty_delta() {
        let chunk = parse_sse_line("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}").unwrap();
        assert_eq!(chunk.content, "");
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn chat_fails_over_to_llm_unavailable_when_unreachable() {
        let config = LlmClientConfig {
            endpoints: vec!["http://127.0.0.1:1".to_string()],
            max_retries: 1,
            ..LlmClientConfig::default()
        };
        let client = HttpLlmClient::new(config);
        let err = client
            .chat(&[Message::user("hi")], &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgenticError::LLMUnavailable { .. }));
    }
}
