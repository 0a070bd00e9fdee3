//! Scripted in-memory model server for controller and engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use super::{FrameStream, ModelServer};
use crate::core::{
    ChatRequest, ChatStreamItem, ManagerError, ModelDetail, ModelSummary, PullProgress, Result,
};

/// Decrements the open-stream counter when the stream holding it is dropped.
struct OpenStream(Arc<AtomicUsize>);

impl OpenStream {
    fn keep(&self) {}
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeServer {
    pub models: Mutex<Vec<ModelSummary>>,
    pub unreachable: Mutex<bool>,
    pub pull_scripts: Mutex<VecDeque<Vec<Result<PullProgress>>>>,
    pub chat_scripts: Mutex<VecDeque<Vec<Result<ChatStreamItem>>>>,
    /// Keep streams open after their scripted frames instead of ending.
    pub hold_open: Mutex<bool>,
    pub calls: Mutex<Vec<String>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub open_streams: Arc<AtomicUsize>,
}

impl FakeServer {
    pub fn with_models(models: Vec<ModelSummary>) -> Self {
        let server = Self::default();
        *server.models.lock().unwrap() = models;
        server
    }

    pub fn script_pull(&self, frames: Vec<Result<PullProgress>>) {
        self.pull_scripts.lock().unwrap().push_back(frames);
    }

    pub fn script_chat(&self, fragments: &[&str]) {
        let frames = fragments
            .iter()
            .map(|f| {
                Ok(ChatStreamItem {
                    content: f.to_string(),
                    done: false,
                })
            })
            .collect();
        self.chat_scripts.lock().unwrap().push_back(frames);
    }

    pub fn script_chat_frames(&self, frames: Vec<Result<ChatStreamItem>>) {
        self.chat_scripts.lock().unwrap().push_back(frames);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if *self.unreachable.lock().unwrap() {
            return Err(ManagerError::ConnectionFailure("connection refused".into()));
        }
        Ok(())
    }

    fn open<T: Send + 'static>(&self, frames: Vec<Result<T>>) -> FrameStream<T> {
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        let guard = OpenStream(self.open_streams.clone());
        let body = stream::iter(frames).map(move |f| {
            guard.keep();
            f
        });
        if *self.hold_open.lock().unwrap() {
            body.chain(stream::pending()).boxed()
        } else {
            body.boxed()
        }
    }
}

#[async_trait]
impl ModelServer for FakeServer {
    async fn list_models(&self) -> Result<Vec<ModelSummary>> {
        self.record("list".into())?;
        Ok(self.models.lock().unwrap().clone())
    }

    async fn show_model(&self, id: &str) -> Result<ModelDetail> {
        self.record(format!("show {id}"))?;
        let models = self.models.lock().unwrap();
        let model = models
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;
        Ok(ModelDetail {
            id: id.to_string(),
            metadata: serde_json::json!({ "details": { "family": model.family } }),
        })
    }

    async fn delete_model(&self, id: &str) -> Result<()> {
        self.record(format!("delete {id}"))?;
        let mut models = self.models.lock().unwrap();
        let before = models.len();
        models.retain(|m| m.id != id);
        if models.len() == before {
            return Err(ManagerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn pull(&self, id: &str) -> Result<FrameStream<PullProgress>> {
        self.record(format!("pull {id}"))?;
        let frames = self.pull_scripts.lock().unwrap().pop_front().unwrap_or_default();
        Ok(self.open(frames))
    }

    async fn chat(&self, request: &ChatRequest) -> Result<FrameStream<ChatStreamItem>> {
        self.record(format!("chat {}", request.model))?;
        self.chat_requests.lock().unwrap().push(request.clone());
        let frames = self.chat_scripts.lock().unwrap().pop_front().unwrap_or_default();
        Ok(self.open(frames))
    }
}
