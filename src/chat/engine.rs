use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::stream::{self, Stream, StreamExt};
use tracing::{debug, info, warn};

use super::session::{ChatSession, SessionConfig};
use crate::core::{ChatMessage, ChatStreamItem, ManagerError, Result};
use crate::providers::{FrameStream, ModelServer, OllamaOptions};

/// Reply committed when no model is selected; the server is not contacted.
pub const NO_MODEL_REPLY: &str = "Model not selected or available.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Streaming,
}

#[derive(Debug)]
struct Shared {
    session: ChatSession,
    state: TurnState,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the conversation and runs one reply at a time against a model
/// server.
pub struct ChatEngine {
    server: Arc<dyn ModelServer>,
    shared: Arc<Mutex<Shared>>,
}

impl ChatEngine {
    pub fn new(server: Arc<dyn ModelServer>, config: SessionConfig) -> Self {
        Self {
            server,
            shared: Arc::new(Mutex::new(Shared {
                session: ChatSession::new(config),
                state: TurnState::Idle,
            })),
        }
    }

    pub fn state(&self) -> TurnState {
        lock(&self.shared).state
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.shared).session.messages().to_vec()
    }

    pub fn config(&self) -> SessionConfig {
        lock(&self.shared).session.config.clone()
    }

    /// Settings apply from the next request on.
    pub fn set_model(&self, model: Option<String>) {
        lock(&self.shared).session.config.model = model.filter(|m| !m.trim().is_empty());
    }

    pub fn set_options(&self, options: OllamaOptions) {
        lock(&self.shared).session.config.options = options;
    }

    pub fn set_system_prompt(&self, prompt: impl Into<String>) {
        lock(&self.shared).session.config.system_prompt = prompt.into();
    }

    pub fn has_pending_turn(&self) -> bool {
        lock(&self.shared).session.has_pending_turn()
    }

    pub fn push_user_message(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(ManagerError::InvalidArgument("message must not be empty".into()));
        }
        let mut shared = lock(&self.shared);
        if shared.state == TurnState::Streaming {
            return Err(ManagerError::SessionBusy);
        }
        shared.session.push(ChatMessage::user(text));
        Ok(())
    }

    /// Reset the history to the seed greeting. Not allowed mid-reply.
    pub fn clear_history(&self) -> Result<()> {
        let mut shared = lock(&self.shared);
        if shared.state == TurnState::Streaming {
            return Err(ManagerError::SessionBusy);
        }
        shared.session.clear();
        info!("Chat history cleared");
        Ok(())
    }

    /// Append a user message and start answering it.
    ///
    /// The message is added and the turn started under one lock, so a
    /// concurrent `send` is rejected with `SessionBusy` without touching
    /// history. If the server cannot be reached the message is taken back
    /// and `send` can simply be retried. Once a reply stream exists the
    /// message stays; after cancelling or a stream error, use `respond`.
    pub async fn send(&self, text: &str) -> Result<ReplyStream> {
        if text.trim().is_empty() {
            return Err(ManagerError::InvalidArgument("message must not be empty".into()));
        }
        self.start_turn(Some(text)).await
    }

    /// Start streaming a reply to the newest unanswered user message.
    ///
    /// The reply is committed to history only once the stream ends. Dropping
    /// the stream earlier cancels the turn and leaves history untouched, so
    /// calling `respond` again re-sends the same pending message.
    pub async fn respond(&self) -> Result<ReplyStream> {
        self.start_turn(None).await
    }

    async fn start_turn(&self, input: Option<&str>) -> Result<ReplyStream> {
        let (request, turn) = {
            let mut shared = lock(&self.shared);
            if shared.state == TurnState::Streaming {
                return Err(ManagerError::SessionBusy);
            }
            if let Some(text) = input {
                shared.session.push(ChatMessage::user(text));
            }
            if !shared.session.has_pending_turn() {
                return Err(ManagerError::InvalidArgument(
                    "no unanswered user message".into(),
                ));
            }
            shared.state = TurnState::Streaming;
            let request = shared
                .session
                .config
                .model
                .clone()
                .map(|model| shared.session.build_request(&model));
            (request, Turn::new(self.shared.clone(), input.is_some()))
        };

        let frames = match request {
            Some(request) => {
                debug!(model = %request.model, messages = request.messages.len(), "Sending chat request");
                match self.server.chat(&request).await {
                    Ok(frames) => frames,
                    Err(e) => {
                        turn.abort();
                        return Err(e);
                    }
                }
            }
            None => {
                warn!("No model selected, answering locally");
                stream::once(async {
                    Ok(ChatStreamItem {
                        content: NO_MODEL_REPLY.to_string(),
                        done: true,
                    })
                })
                .boxed()
            }
        };

        Ok(ReplyStream {
            frames,
            text: String::new(),
            turn: Some(turn),
            committed: false,
        })
    }
}

/// Marks the session as streaming for as long as it lives.
struct Turn {
    shared: Arc<Mutex<Shared>>,
    /// The user message was added when this turn started.
    owns_input: bool,
    armed: bool,
}

impl Turn {
    fn new(shared: Arc<Mutex<Shared>>, owns_input: bool) -> Self {
        Self {
            shared,
            owns_input,
            armed: true,
        }
    }

    /// The request never reached the server: undo the turn entirely.
    fn abort(mut self) {
        let mut shared = lock(&self.shared);
        if self.owns_input {
            shared.session.pop_pending();
        }
        shared.state = TurnState::Idle;
        self.armed = false;
        debug!("Chat request failed, turn rolled back");
    }

    fn commit(mut self, text: String) {
        let mut shared = lock(&self.shared);
        shared.session.push(ChatMessage::assistant(text));
        shared.state = TurnState::Idle;
        self.armed = false;
        debug!("Reply committed");
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        if self.armed {
            lock(&self.shared).state = TurnState::Idle;
            debug!("Reply abandoned before completion");
        }
    }
}

/// Incoming reply fragments. Each item is the fragment carried by one frame;
/// `text()` holds everything received so far.
pub struct ReplyStream {
    frames: FrameStream<ChatStreamItem>,
    text: String,
    turn: Option<Turn>,
    committed: bool,
}

impl ReplyStream {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Drain the reply and return the committed text.
    pub async fn finish(mut self) -> Result<String> {
        while let Some(fragment) = self.next().await {
            fragment?;
        }
        Ok(std::mem::take(&mut self.text))
    }

    fn commit(&mut self) {
        if let Some(turn) = self.turn.take() {
            turn.commit(self.text.clone());
            self.committed = true;
        }
        self.release();
    }

    /// Close the connection as soon as the turn is over.
    fn release(&mut self) {
        self.frames = stream::empty().boxed();
    }
}

impl Stream for ReplyStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.turn.is_none() {
            return Poll::Ready(None);
        }

        match this.frames.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(item))) => {
                this.text.push_str(&item.content);
                if item.done {
                    this.commit();
                }
                Poll::Ready(Some(Ok(item.content)))
            }
            Poll::Ready(Some(Err(e))) => {
                warn!(error = %e, "Chat stream failed");
                this.turn.take();
                this.release();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.commit();
                Poll::Ready(None)
            }
        }
    }
}
