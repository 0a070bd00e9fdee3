use serde::Deserialize;

use crate::core::{ChatStreamItem, ManagerError, ModelSummary, PullProgress, Result};

#[derive(Deserialize, Debug, Default)]
pub struct ModelDetails {
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub parameter_size: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub quantization_level: String,
}

#[derive(Deserialize, Debug)]
pub struct Model {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub modified_at: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub details: ModelDetails,
}

impl From<Model> for ModelSummary {
    fn from(model: Model) -> Self {
        ModelSummary {
            id: model.model.filter(|m| !m.is_empty()).unwrap_or(model.name),
            size: model.size,
            modified_at: model.modified_at,
            family: model.details.family,
            parameter_size: model.details.parameter_size,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct ListModelsResponse {
    #[serde(default)]
    pub models: Vec<Model>,
}

/// Body of a non-2xx response, when the server sent JSON.
#[derive(Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Deserialize, Debug)]
pub struct PullResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PullResponse {
    pub fn into_progress(self, model: &str) -> Result<PullProgress> {
        if let Some(error) = self.error {
            return Err(ManagerError::from_server_message(model, 200, error));
        }
        Ok(PullProgress {
            status: self.status,
            digest: self.digest,
            total: self.total,
            completed: self.completed,
        })
    }
}

#[derive(Deserialize, Debug)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize, Debug)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ChatResponse {
    pub fn into_item(self, model: &str) -> Result<ChatStreamItem> {
        if let Some(error) = self.error {
            return Err(ManagerError::from_server_message(model, 200, error));
        }
        Ok(ChatStreamItem {
            content: self.message.map(|m| m.content).unwrap_or_default(),
            done: self.done,
        })
    }
}
