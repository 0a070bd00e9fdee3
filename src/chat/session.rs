//! Chat session state
//!
//! Configuration plus the ordered message history of one conversation.

use serde::{Deserialize, Serialize};

use crate::core::{ChatMessage, ChatRequest, Role};
use crate::providers::OllamaOptions;

/// First entry of every fresh or cleared history.
pub const SEED_GREETING: &str = "How may I assist you today?";

/// Sent after the system prompt on every request, ahead of the history.
pub const PREAMBLE_GREETING: &str =
    "Hello, I am your personal AI assistant. How can I help you today?";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Your responsibility is to assist your user to the best of your ability. You must be helpful and direct in your communication.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// `None` until the user picks a model.
    pub model: Option<String>,
    pub options: OllamaOptions,
    pub system_prompt: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: None,
            options: OllamaOptions::chat_defaults(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    pub config: SessionConfig,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            messages: vec![ChatMessage::assistant(SEED_GREETING)],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Take back the newest entry if it still waits for a reply.
    pub fn pop_pending(&mut self) -> Option<ChatMessage> {
        if self.has_pending_turn() {
            self.messages.pop()
        } else {
            None
        }
    }

    /// Drop every turn and start over from the seed greeting.
    pub fn clear(&mut self) {
        self.messages = vec![ChatMessage::assistant(SEED_GREETING)];
    }

    /// True while the newest entry still waits for an assistant reply.
    pub fn has_pending_turn(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|m| m.role != Role::Assistant)
    }

    /// System prompt, fixed preamble, then the history, whose last entry is
    /// the user message being answered.
    pub fn build_request(&self, model: &str) -> ChatRequest {
        let mut messages = Vec::with_capacity(self.messages.len() + 2);
        messages.push(ChatMessage::system(self.config.system_prompt.clone()));
        messages.push(ChatMessage::assistant(PREAMBLE_GREETING));
        messages.extend(self.messages.iter().cloned());

        ChatRequest {
            model: model.to_string(),
            messages,
            options: self.config.options.clone(),
            stream: true,
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
