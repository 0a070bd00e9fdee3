use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ManagerError;
use crate::providers::ollama::OllamaOptions;

/// One installed model as reported by the registry list call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelSummary {
    /// `name:tag`, unique within a snapshot
    pub id: String,
    pub size: u64,
    pub modified_at: String,
    pub family: String,
    /// Free-form label such as "7B" or "500M"
    pub parameter_size: String,
}

impl ModelSummary {
    pub fn modified(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.modified_at).ok()
    }
}

/// Metadata returned by the inspect call. The tree is kept opaque.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ModelDetail {
    pub id: String,
    pub metadata: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Pull,
    Update,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Pull => write!(f, "pull"),
            OperationKind::Update => write!(f, "update"),
        }
    }
}

/// Raw pull frame as decoded from the server stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullProgress {
    pub status: String,
    pub digest: Option<String>,
    pub total: Option<u64>,
    pub completed: Option<u64>,
}

/// Normalized progress event emitted by the tracker.
#[derive(Debug)]
pub struct OperationProgress {
    pub operation_id: Uuid,
    pub kind: OperationKind,
    pub target: String,
    pub status: String,
    pub bytes_completed: u64,
    /// Unknown until the server reports a non-zero total.
    pub bytes_total: Option<u64>,
    /// Only present when the frame carried usable byte counts.
    pub fraction: Option<f64>,
    pub terminal: bool,
    pub error: Option<ManagerError>,
}

impl OperationProgress {
    pub fn is_success(&self) -> bool {
        self.terminal && self.error.is_none()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Outbound body of the streaming chat call.
#[derive(Serialize, Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub options: OllamaOptions,
    pub stream: bool,
}

/// One decoded chat frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatStreamItem {
    pub content: String,
    pub done: bool,
}
