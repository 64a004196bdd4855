//! Token-budgeted conversation history.
//!
//! Mirrors the trim loop in the teacher's session type, but adds the protection
//! invariants the workflow engine depends on: the first message (system prompt) is never
//! trimmed, and neither is the most recent user or assistant message.

use serde::{Deserialize, Serialize};

use super::message::{estimate_message_tokens, Message, Role};

/// Ordered message sequence kept within a token budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    messages: Vec<Message>,
    max_prompt_tokens: usize,
}

impl ConversationHistory {
    pub fn new(system_prompt: impl Into<std::sync::Arc<str>>, max_prompt_tokens: usize) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            max_prompt_tokens,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn total_tokens(&self) -> usize {
        self.messages.iter().map(estimate_message_tokens).sum()
    }

    /// Index of the last message with the given role, if any.
    fn last_index_of(&self, role: Role) -> Option<usize> {
        self.messages
            .iter()
            .enumerate()
            .rev()
            .find(|(_, m)| m.role == role)
            .map(|(i, _)| i)
    }

    /// Append a message, then trim the oldest eligible messages until the budget is met
    /// or no further message can be removed without violating an invariant.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.trim();
    }

    fn trim(&mut self) {
        while self.total_tokens() > self.max_prompt_tokens {
            let last_user = self.last_index_of(Role::User);
            let last_assistant = self.last_index_of(Role::Assistant);

            // Index 0 (system prompt) is always protected. Find the oldest index
            // at or after 1 that is not the last user/assistant message.
            let removable = (1..self.messages.len()).find(|&i| {
                Some(i) != last_user && Some(i) != last_assistant
            });

            match removable {
                Some(i) => {
                    self.messages.remove(i);
                }
                None => break, // Nothing left that can be trimmed without violating an invariant.
            }
        }
    }

    /// Whether the current history satisfies the token-budget invariant (§8: either the
    /// total is within budget, or every remaining message is protected).
    pub fn within_budget(&self) -> bool {
        if self.total_tokens() <= self.max_prompt_tokens {
            return true;
        }
        let last_user = self.last_index_of(Role::User);
        let last_assistant = self.last_index_of(Role::Assistant);
        (1..self.messages.len()).all(|i| Some(i) == last_user || Some(i) == last_assistant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_survives_aggressive_trimming() {
        let mut history = ConversationHistory::new("be helpful", 20);
        for i in 0..50 {
            history.add_message(Message::user(format!("message number {i} padded out long")));
        }
        assert_eq!(history.messages()[0].role, Role::System);
    }

    #[test]
    fn last_user_and_assistant_are_never_trimmed() {
        let mut history = ConversationHistory::new("sys", 10);
        history.add_message(Message::user("a very long user message that blows the budget"));
        history.add_message(Message::assistant("a very long assistant reply also over budget"));
        let last = history.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(history
            .messages()
            .iter()
            .any(|m| m.role == Role::User));
    }

    #[test]
    fn within_budget_property_holds_after_every_add() {
        let mut history = ConversationHistory::new("sys", 50);
        for i in 0..20 {
            history.add_message(Message::user(format!("u{i}")));
            history.add_message(Message::assistant(format!("a{i}")));
            assert!(history.within_budget());
        }
    }
}
