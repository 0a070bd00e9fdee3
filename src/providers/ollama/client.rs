use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::stream::ndjson_frames;
use super::types::{ChatResponse, ErrorResponse, ListModelsResponse, PullResponse};
use crate::core::{
    ChatRequest, ChatStreamItem, ConnectionConfig, ManagerError, ModelDetail, ModelSummary,
    PullProgress, Result,
};
use crate::providers::{FrameStream, ModelServer};

/// HTTP transport for the Ollama REST API.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    config: ConnectionConfig,
}

impl OllamaClient {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn endpoint(&self) -> String {
        self.config.host()
    }

    fn url(host: &str, path: &str) -> String {
        format!("{}/api/{}", host, path)
    }

    #[instrument(skip(self))]
    pub async fn list_local_models(&self) -> Result<Vec<ModelSummary>> {
        let settings = self.config.snapshot();
        let timeout = settings.timeout();
        let request = self.client.get(Self::url(&settings.host, "tags"));

        let body: ListModelsResponse = within(timeout, async {
            let response = checked(send(request, timeout).await?, None, timeout).await?;
            response
                .json::<ListModelsResponse>()
                .await
                .map_err(|e| ManagerError::from_reqwest(e, timeout))
        })
        .await?;

        info!(count = body.models.len(), host = %settings.host, "Fetched models");
        Ok(body.models.into_iter().map(ModelSummary::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn show_model_info(&self, model_name: &str) -> Result<ModelDetail> {
        let settings = self.config.snapshot();
        let timeout = settings.timeout();
        let request = self
            .client
            .post(Self::url(&settings.host, "show"))
            .json(&json!({ "model": model_name }));

        let metadata = within(timeout, async {
            let response = checked(send(request, timeout).await?, Some(model_name), timeout).await?;
            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| ManagerError::from_reqwest(e, timeout))
        })
        .await?;

        debug!("Fetched model details");
        Ok(ModelDetail {
            id: model_name.to_string(),
            metadata,
        })
    }

    #[instrument(skip(self))]
    pub async fn remove_model(&self, model_name: &str) -> Result<()> {
        let settings = self.config.snapshot();
        let timeout = settings.timeout();
        let request = self
            .client
            .delete(Self::url(&settings.host, "delete"))
            .json(&json!({ "model": model_name }));

        within(timeout, async {
            checked(send(request, timeout).await?, Some(model_name), timeout).await
        })
        .await?;

        info!("Deleted model");
        Ok(())
    }

    /// Open a pull. The timeout bounds the wait for response headers and then
    /// each gap between body chunks; the download as a whole has no deadline.
    #[instrument(skip(self))]
    pub async fn pull_model_stream(&self, model_name: &str) -> Result<FrameStream<PullProgress>> {
        let settings = self.config.snapshot();
        let timeout = settings.timeout();
        let request = self
            .client
            .post(Self::url(&settings.host, "pull"))
            .json(&json!({ "model": model_name, "stream": true }));

        let response = within(timeout, async {
            checked(send(request, timeout).await?, Some(model_name), timeout).await
        })
        .await?;
        info!(host = %settings.host, "Pull stream opened");

        let model = model_name.to_string();
        let frames = ndjson_frames::<PullResponse, _>(body_stream(response, timeout))
            .map(move |frame| frame.and_then(|f| f.into_progress(&model)));
        Ok(frames.boxed())
    }

    #[instrument(skip(self, request), fields(model = %request.model, messages = request.messages.len()))]
    pub async fn send_chat_request_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<FrameStream<ChatStreamItem>> {
        let settings = self.config.snapshot();
        let timeout = settings.timeout();
        let builder = self
            .client
            .post(Self::url(&settings.host, "chat"))
            .json(request);

        let response = within(timeout, async {
            checked(send(builder, timeout).await?, Some(request.model.as_str()), timeout).await
        })
        .await?;
        debug!("Chat stream opened");

        let model = request.model.clone();
        let frames = ndjson_frames::<ChatResponse, _>(body_stream(response, timeout))
            .map(move |frame| frame.and_then(|f| f.into_item(&model)));
        Ok(frames.boxed())
    }
}

#[async_trait]
impl ModelServer for OllamaClient {
    async fn list_models(&self) -> Result<Vec<ModelSummary>> {
        self.list_local_models().await
    }

    async fn show_model(&self, id: &str) -> Result<ModelDetail> {
        self.show_model_info(id).await
    }

    async fn delete_model(&self, id: &str) -> Result<()> {
        self.remove_model(id).await
    }

    async fn pull(&self, id: &str) -> Result<FrameStream<PullProgress>> {
        self.pull_model_stream(id).await
    }

    async fn chat(&self, request: &ChatRequest) -> Result<FrameStream<ChatStreamItem>> {
        self.send_chat_request_stream(request).await
    }
}

async fn within<T>(timeout: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ManagerError::Timeout(timeout))?
}

async fn send(request: RequestBuilder, timeout: Duration) -> Result<Response> {
    request.send().await.map_err(|e| {
        let err = ManagerError::from_reqwest(e, timeout);
        warn!(error = %err, "Request failed");
        err
    })
}

/// Turn a non-2xx response into the matching error, reading the server's
/// `{"error": ...}` body when there is one. Only calls about a specific
/// model can report it missing.
async fn checked(response: Response, model: Option<&str>, timeout: Duration) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .map_err(|e| ManagerError::from_reqwest(e, timeout))?;
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    warn!(status = status.as_u16(), %message, "Model server rejected request");

    match model {
        Some(model) if status == reqwest::StatusCode::NOT_FOUND => {
            Err(ManagerError::NotFound(model.to_string()))
        }
        Some(model) => Err(ManagerError::from_server_message(model, status.as_u16(), message)),
        None => Err(ManagerError::Upstream {
            status: status.as_u16(),
            message,
        }),
    }
}

/// Body chunks with an idle deadline: a server that goes quiet for longer
/// than `timeout` ends the stream with `Timeout`.
fn body_stream(response: Response, timeout: Duration) -> FrameStream<bytes::Bytes> {
    let body = response.bytes_stream().boxed();
    stream::unfold(Some(body), move |body| async move {
        let mut body = body?;
        match tokio::time::timeout(timeout, body.next()).await {
            Ok(Some(chunk)) => {
                let chunk = chunk.map_err(|e| ManagerError::from_reqwest(e, timeout));
                Some((chunk, Some(body)))
            }
            Ok(None) => None,
            Err(_) => {
                warn!(?timeout, "Model server stalled mid-stream");
                Some((Err(ManagerError::Timeout(timeout)), None))
            }
        }
    })
    .boxed()
}
