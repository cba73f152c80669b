//! API request/response bodies.

use serde::{Deserialize, Serialize};

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub ok: bool,
}

/// Scheduler occupancy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    /// Entries waiting for a slot.
    pub queued: usize,
    /// Jobs holding a slot.
    pub active: usize,
    pub max_concurrent_tasks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
    pub uptime_secs: u64,
}
