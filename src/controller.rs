use std::sync::Arc;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::core::{
    ManagerError, ModelDetail, OperationKind, OperationProgress, ProgressTracker, RegistrySnapshot,
    Result,
};
use crate::providers::ModelServer;

const EVENT_CAPACITY: usize = 64;

pub type ProgressStream = BoxStream<'static, OperationProgress>;

/// Published after every state-changing call so a front-end can refresh
/// what it shows without rebuilding everything.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    RegistryRefreshed { count: usize },
    ModelRemoved { id: String },
    OperationFinished {
        kind: OperationKind,
        id: String,
        succeeded: bool,
    },
}

/// Orchestrates registry, pull/update, delete and inspect calls. Errors are
/// returned as they come; nothing is retried here.
pub struct OperationController {
    server: Arc<dyn ModelServer>,
    events: broadcast::Sender<ControllerEvent>,
}

impl OperationController {
    pub fn new(server: Arc<dyn ModelServer>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { server, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    #[instrument(skip(self))]
    pub async fn refresh_registry(&self) -> Result<RegistrySnapshot> {
        let models = self.server.list_models().await.inspect_err(|e| {
            warn!(error = %e, "Failed to load models");
        })?;
        let snapshot = RegistrySnapshot::new(models);
        self.notify(ControllerEvent::RegistryRefreshed {
            count: snapshot.len(),
        });
        Ok(snapshot)
    }

    pub async fn pull_new(&self, id: &str) -> Result<ProgressStream> {
        self.start_pull(OperationKind::Pull, id).await
    }

    /// Same protocol operation as `pull_new`, labelled as an update.
    pub async fn update_existing(&self, id: &str) -> Result<ProgressStream> {
        self.start_pull(OperationKind::Update, id).await
    }

    #[instrument(skip(self))]
    pub async fn delete_existing(&self, id: &str) -> Result<()> {
        let id = validate_model_id(id)?;
        self.server.delete_model(id).await.inspect_err(|e| {
            warn!(model = id, error = %e, "Error deleting model");
        })?;
        info!(model = id, "Successfully deleted model");
        self.notify(ControllerEvent::ModelRemoved { id: id.to_string() });
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn inspect(&self, id: &str) -> Result<ModelDetail> {
        let id = validate_model_id(id)?;
        self.server.show_model(id).await.inspect_err(|e| {
            warn!(model = id, error = %e, "Error getting model details");
        })
    }

    #[instrument(skip(self))]
    async fn start_pull(&self, kind: OperationKind, id: &str) -> Result<ProgressStream> {
        let id = validate_model_id(id)?;
        let frames = self.server.pull(id).await.inspect_err(|e| {
            warn!(%kind, model = id, error = %e, "Could not start operation");
        })?;

        let tracker = ProgressTracker::new(kind, id);
        info!(%kind, model = id, operation = %tracker.operation_id(), "Operation started");

        let events = self.events.clone();
        let stream = tracker.track(frames).inspect(move |progress| {
            if progress.terminal {
                let _ = events.send(ControllerEvent::OperationFinished {
                    kind: progress.kind,
                    id: progress.target.clone(),
                    succeeded: progress.is_success(),
                });
            }
        });
        Ok(stream.boxed())
    }

    fn notify(&self, event: ControllerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Trimmed identifier, or `InvalidArgument` for empty or whitespace-split
/// names.
pub fn validate_model_id(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ManagerError::InvalidArgument(
            "model name must not be empty".into(),
        ));
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ManagerError::InvalidArgument(format!(
            "model name {id:?} contains whitespace"
        )));
    }
    Ok(id)
}
