//! LLM client: wire format, conversation history, endpoint health, and dual-endpoint failover.

pub mod client;
pub mod endpoint;
pub mod history;
pub mod message;

pub use client::{ChatOptions, ChatReply, HttpLlmClient, LlmClient, LlmClientConfig, MessageChunkStream};
pub use endpoint::{EndpointHealth, EndpointMode, EndpointPool, EndpointStatus};
pub use history::ConversationHistory;
pub use message::{estimate_message_tokens, estimate_tokens, Message, MessageChunk, Role};
