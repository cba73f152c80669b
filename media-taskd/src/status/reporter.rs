use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::{StatusEvent, StatusSink};

/// Events a single task may have waiting for delivery.
///
/// Progress beyond this is dropped while the sink is slow; the next event
/// carries newer progress anyway.
const TASK_BACKLOG: usize = 16;

/// Non-blocking handle for publishing status events.
///
/// Cloning is cheap; all clones feed the same delivery task. Reporting never
/// waits on the network. Each task gets its own delivery lane, so events for
/// one task reach the sink in the order they were reported while a slow
/// delivery for one task never holds back another.
#[derive(Clone)]
pub struct StatusReporter {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl StatusReporter {
    /// Start a delivery task that forwards every reported event to `sink`.
    ///
    /// The returned handle completes once every reporter handle has been
    /// dropped and every lane has delivered what it still holds.
    pub fn spawn(sink: Arc<dyn StatusSink>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<StatusEvent>();

        let handle = tokio::spawn(async move {
            let lanes_tracker = TaskTracker::new();
            let mut lanes: HashMap<String, mpsc::Sender<StatusEvent>> = HashMap::new();

            while let Some(event) = rx.recv().await {
                let terminal = event.status.is_terminal();
                let lane = lanes
                    .entry(event.task_id.clone())
                    .or_insert_with(|| open_lane(&lanes_tracker, sink.clone()))
                    .clone();
                if terminal {
                    // Nothing follows a terminal event; the lane closes once drained.
                    lanes.remove(&event.task_id);
                }
                route(&lanes_tracker, &lane, event, terminal);
            }

            drop(lanes);
            lanes_tracker.close();
            lanes_tracker.wait().await;
            debug!("Status delivery task finished");
        });

        (Self { tx }, handle)
    }

    /// A reporter feeding an existing channel.
    pub fn from_sender(tx: mpsc::UnboundedSender<StatusEvent>) -> Self {
        Self { tx }
    }

    /// A reporter whose events go nowhere.
    pub fn noop() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel::<StatusEvent>();
        Self { tx }
    }

    /// Queue an event for delivery.
    pub fn report(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }
}

/// Spawn the sequential delivery worker for one task.
fn open_lane(tracker: &TaskTracker, sink: Arc<dyn StatusSink>) -> mpsc::Sender<StatusEvent> {
    let (lane_tx, mut lane_rx) = mpsc::channel::<StatusEvent>(TASK_BACKLOG);
    tracker.spawn(async move {
        while let Some(event) = lane_rx.recv().await {
            deliver(sink.as_ref(), &event).await;
        }
    });
    lane_tx
}

fn route(
    tracker: &TaskTracker,
    lane: &mpsc::Sender<StatusEvent>,
    event: StatusEvent,
    terminal: bool,
) {
    match lane.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) if terminal => {
            // The final state must not be lost to a full backlog.
            let lane = lane.clone();
            tracker.spawn(async move {
                let _ = lane.send(event).await;
            });
        }
        Err(TrySendError::Full(event)) => debug!(
            task_id = %event.task_id,
            progress = event.progress,
            "Status backlog full, dropping progress event"
        ),
        Err(TrySendError::Closed(event)) => warn!(
            task_id = %event.task_id,
            status = %event.status,
            "Status lane closed, dropping event"
        ),
    }
}

async fn deliver(sink: &dyn StatusSink, event: &StatusEvent) {
    match sink.deliver(event).await {
        Ok(()) => debug!(
            task_id = %event.task_id,
            status = %event.status,
            progress = event.progress,
            "Status delivered"
        ),
        Err(e) => warn!(
            task_id = %event.task_id,
            status = %event.status,
            error = %e,
            "Failed to deliver task status, dropping event"
        ),
    }
}
