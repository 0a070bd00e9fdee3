use std::collections::HashMap;

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ManagerError, OperationKind, OperationProgress, PullProgress};
use crate::providers::FrameStream;

/// Turns raw pull frames into `OperationProgress` events.
///
/// Byte counts are tracked per layer digest and summed, so the reported
/// completed bytes never go backwards when the server moves on to the next
/// layer. The server sends no completion marker; end of stream is the only
/// success signal, and an error closes the operation instead.
#[derive(Debug)]
pub struct ProgressTracker {
    operation_id: Uuid,
    kind: OperationKind,
    target: String,
    status: String,
    layers: HashMap<String, (u64, u64)>,
    completed: u64,
    total: Option<u64>,
    finished: bool,
}

impl ProgressTracker {
    pub fn new(kind: OperationKind, target: impl Into<String>) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            kind,
            target: target.into(),
            status: String::new(),
            layers: HashMap::new(),
            completed: 0,
            total: None,
            finished: false,
        }
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fold one frame into the running totals.
    pub fn observe(&mut self, frame: &PullProgress) -> OperationProgress {
        if !frame.status.is_empty() {
            self.status = frame.status.clone();
        }

        let mut fraction = None;
        if let (Some(completed), Some(total)) = (frame.completed, frame.total) {
            if total > 0 {
                let key = frame.digest.clone().unwrap_or_default();
                let layer = self.layers.entry(key).or_insert((0, 0));
                layer.0 = layer.0.max(completed);
                layer.1 = layer.1.max(total);

                let (done, all) = self
                    .layers
                    .values()
                    .fold((0u64, 0u64), |acc, l| (acc.0 + l.0.min(l.1), acc.1 + l.1));
                self.completed = self.completed.max(done);
                self.total = Some(all);
                fraction = Some((self.completed as f64 / all as f64).clamp(0.0, 1.0));
            }
        }

        self.event(fraction, false, None)
    }

    /// Close the operation. Later calls return `None`.
    pub fn finish(&mut self, error: Option<ManagerError>) -> Option<OperationProgress> {
        if self.finished {
            return None;
        }
        self.finished = true;
        match &error {
            Some(e) => warn!(operation = %self.operation_id, target = %self.target, error = %e, "Operation failed"),
            None => debug!(operation = %self.operation_id, target = %self.target, "Operation stream ended"),
        }
        Some(self.event(None, true, error))
    }

    /// Drive a frame stream to completion, emitting one event per frame and
    /// a final terminal event.
    pub fn track(self, frames: FrameStream<PullProgress>) -> BoxStream<'static, OperationProgress> {
        stream::unfold((self, frames), |(mut tracker, mut frames)| async move {
            if tracker.finished {
                return None;
            }
            let (event, frames) = match frames.next().await {
                Some(Ok(frame)) => (tracker.observe(&frame), frames),
                // The source goes with the terminal event, closing its connection.
                Some(Err(e)) => (tracker.finish(Some(e))?, stream::empty().boxed()),
                None => (tracker.finish(None)?, stream::empty().boxed()),
            };
            Some((event, (tracker, frames)))
        })
        .boxed()
    }

    fn event(
        &self,
        fraction: Option<f64>,
        terminal: bool,
        error: Option<ManagerError>,
    ) -> OperationProgress {
        OperationProgress {
            operation_id: self.operation_id,
            kind: self.kind,
            target: self.target.clone(),
            status: self.status.clone(),
            bytes_completed: self.completed,
            bytes_total: self.total,
            fraction,
            terminal,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(status: &str, completed: Option<u64>, total: Option<u64>) -> PullProgress {
        PullProgress {
            status: status.to_string(),
            digest: None,
            total,
            completed,
        }
    }

    async fn run(frames: Vec<crate::core::Result<PullProgress>>) -> Vec<OperationProgress> {
        ProgressTracker::new(OperationKind::Pull, "llama3:latest")
            .track(stream::iter(frames).boxed())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_download_fractions_and_terminal() {
        let events = run(vec![
            Ok(frame("downloading", Some(100), Some(1000))),
            Ok(frame("downloading", Some(500), Some(1000))),
            Ok(frame("downloading", Some(1000), Some(1000))),
        ])
        .await;

        let fractions: Vec<Option<f64>> = events.iter().map(|e| e.fraction).collect();
        assert_eq!(fractions, vec![Some(0.1), Some(0.5), Some(1.0), None]);
        assert_eq!(events.iter().filter(|e| e.terminal).count(), 1);

        let last = events.last().expect("terminal event");
        assert!(last.terminal);
        assert!(last.error.is_none());
        assert!(last.is_success());
        assert_eq!(last.bytes_completed, 1000);
        assert_eq!(last.bytes_total, Some(1000));
    }

    #[tokio::test]
    async fn test_zero_or_missing_total_keeps_status_only() {
        let events = run(vec![
            Ok(frame("pulling manifest", None, None)),
            Ok(frame("verifying", Some(0), Some(0))),
        ])
        .await;

        assert_eq!(events[0].status, "pulling manifest");
        assert!(events[0].fraction.is_none());
        assert_eq!(events[1].status, "verifying");
        assert!(events[1].fraction.is_none());
        assert!(events[1].bytes_total.is_none());
        assert!(!events[1].terminal);
    }

    #[tokio::test]
    async fn test_fractions_monotone_within_bounds() {
        for total in [1u64, 7, 1000, 4_200_000_000] {
            let steps = 13u64;
            let frames = (0..=steps)
                .map(|i| Ok(frame("downloading", Some(total * i / steps), Some(total))))
                .collect();
            let events = run(frames).await;

            let fractions: Vec<f64> = events.iter().filter_map(|e| e.fraction).collect();
            assert_eq!(fractions.len() as u64, steps + 1);
            assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
            assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
        }
    }

    #[tokio::test]
    async fn test_mid_stream_error_is_terminal() {
        let events = run(vec![
            Ok(frame("downloading", Some(10), Some(100))),
            Err(ManagerError::StreamDecode("garbage".into())),
            Ok(frame("downloading", Some(90), Some(100))),
        ])
        .await;

        assert_eq!(events.len(), 2);
        let last = &events[1];
        assert!(last.terminal);
        assert!(!last.is_success());
        assert!(matches!(last.error, Some(ManagerError::StreamDecode(_))));
        assert_eq!(last.bytes_completed, 10);
        assert_eq!(last.status, "downloading");
    }

    #[tokio::test]
    async fn test_layers_accumulate() {
        let layer = |digest: &str, completed, total| PullProgress {
            status: format!("pulling {digest}"),
            digest: Some(digest.to_string()),
            total: Some(total),
            completed: Some(completed),
        };
        let events = run(vec![
            Ok(layer("sha256:a", 50, 100)),
            Ok(layer("sha256:a", 100, 100)),
            Ok(layer("sha256:b", 10, 300)),
            Ok(layer("sha256:b", 300, 300)),
        ])
        .await;

        let completed: Vec<u64> = events.iter().map(|e| e.bytes_completed).collect();
        assert_eq!(completed, vec![50, 100, 110, 400, 400]);
        assert_eq!(events[2].bytes_total, Some(400));
        assert_eq!(events[3].fraction, Some(1.0));
    }

    #[test]
    fn test_finish_only_once() {
        let mut tracker = ProgressTracker::new(OperationKind::Update, "m");
        assert!(tracker.finish(None).is_some());
        assert!(tracker.finish(None).is_none());
        assert!(tracker.is_finished());
    }
}
