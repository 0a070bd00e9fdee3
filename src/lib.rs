pub mod core;
pub mod providers;
pub mod controller;
pub mod chat;

// Re-export core types
pub use crate::core::{
    ChatMessage, ChatRequest, ChatStreamItem, ConnectionConfig, ConnectionSettings, ManagerError,
    ModelDetail, ModelSummary, OperationKind, OperationProgress, ProgressTracker, PullProgress,
    RegistrySnapshot, Result, Role, SortKey,
};
pub use providers::{FrameStream, ModelServer, OllamaClient, OllamaOptions};

// Main interface
pub use controller::{ControllerEvent, OperationController, ProgressStream};
pub use chat::{ChatEngine, ChatSession, ReplyStream, SessionConfig, TurnState};
