use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::core::{ChatRequest, ChatStreamItem, ModelDetail, ModelSummary, PullProgress, Result};

pub mod ollama;
#[cfg(test)]
pub(crate) mod fake;

pub use ollama::{OllamaClient, OllamaOptions};

/// Lazily decoded frames of a streaming call. Dropping the stream closes the
/// underlying connection.
pub type FrameStream<T> = BoxStream<'static, Result<T>>;

/// Calls the controller and chat engine need from a model server.
#[async_trait]
pub trait ModelServer: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelSummary>>;

    async fn show_model(&self, id: &str) -> Result<ModelDetail>;

    async fn delete_model(&self, id: &str) -> Result<()>;

    /// Start a pull; used for both fresh downloads and updates.
    async fn pull(&self, id: &str) -> Result<FrameStream<PullProgress>>;

    async fn chat(&self, request: &ChatRequest) -> Result<FrameStream<ChatStreamItem>>;
}
