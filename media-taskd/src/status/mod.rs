//! Task status events and their delivery to the request server.
//!
//! Jobs publish [`StatusEvent`]s through a [`StatusReporter`] handle, which
//! forwards them to a [`StatusSink`] in the order each task reported them.
//! Delivery is best-effort: a failed delivery is logged and the event
//! dropped, as is progress a slow sink cannot keep up with.

mod reporter;
mod sink;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::pipeline::TaskKind;

pub use reporter::StatusReporter;
pub use sink::{HttpStatusSink, StatusSink};

/// Task state as understood by the request server.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum TaskStatus {
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One progress or terminal-state notification for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub task_id: String,
    pub task_name: TaskKind,
    pub status: TaskStatus,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    /// Current output rate in bytes per second, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<u64>,
}

impl StatusEvent {
    pub fn new(
        task_id: impl Into<String>,
        task_name: TaskKind,
        status: TaskStatus,
        progress: f64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_name,
            status,
            progress,
            bandwidth: None,
        }
    }

    pub fn in_progress(task_id: impl Into<String>, task_name: TaskKind, progress: f64) -> Self {
        Self::new(task_id, task_name, TaskStatus::InProgress, progress)
    }

    pub fn completed(task_id: impl Into<String>, task_name: TaskKind) -> Self {
        Self::new(task_id, task_name, TaskStatus::Completed, 100.0)
    }

    pub fn failed(task_id: impl Into<String>, task_name: TaskKind) -> Self {
        Self::new(task_id, task_name, TaskStatus::Failed, 0.0)
    }

    pub fn with_bandwidth(mut self, bandwidth: Option<u64>) -> Self {
        self.bandwidth = bandwidth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_value(TaskStatus::InProgress).unwrap(), json!("INPROGRESS"));
        assert_eq!(TaskStatus::Completed.to_string(), "COMPLETED");
        assert_eq!("FAILED".parse::<TaskStatus>().unwrap(), TaskStatus::Failed);
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_event_payload_shape() {
        let event = StatusEvent::in_progress("t-1", TaskKind::Lowres, 42.5);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "task_id": "t-1",
                "task_name": "generate_lowres",
                "status": "INPROGRESS",
                "progress": 42.5
            })
        );

        let event = event.with_bandwidth(Some(262_144));
        assert_eq!(serde_json::to_value(&event).unwrap()["bandwidth"], json!(262_144));
    }

    #[test]
    fn test_terminal_constructors() {
        let done = StatusEvent::completed("t-2", TaskKind::Thumbnail);
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.progress, 100.0);

        let failed = StatusEvent::failed("t-2", TaskKind::Thumbnail);
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.progress, 0.0);
    }
}
