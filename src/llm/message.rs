//! Chat message primitives shared by the LLM client and conversation history.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single turn in a conversation.
///
/// `content` is stored as `Arc<str>` so that `ConversationHistory` can clone the running
/// transcript cheaply on every `chat_completion` call without copying message bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Arc<str>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<Arc<str>>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<Arc<str>>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<Arc<str>>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<Arc<str>>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// First 500 characters of the content, newline-collapsed — matches the LLM Client's
    /// INFO-level logging contract.
    pub fn preview(&self, max_chars: usize) -> String {
        let collapsed = self.content.replace('\n', " ");
        if collapsed.chars().count() <= max_chars {
            collapsed
        } else {
            collapsed.chars().take(max_chars).collect::<String>() + "…"
        }
    }
}

/// A chunk of a streaming completion.
#[derive(Debug, Clone)]
pub struct MessageChunk {
    pub content: String,
    pub finish_reason: Option<String>,
}

/// Approximate token count using the 4-chars-per-token estimator used throughout this
/// runtime's budget accounting (Conversation History, prompt truncation).
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

pub fn estimate_message_tokens(message: &Message) -> usize {
    // +1 for the role annotation, matching the per-message overhead assumed elsewhere.
    1 + estimate_tokens(&message.content)
}
