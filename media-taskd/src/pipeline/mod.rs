//! Media task pipeline.
//!
//! - [`jobs`]: thumbnail and lowres jobs and their progress reporting
//! - [`TaskEngine`]: priority queue, concurrency cap and dispatch loop
//! - [`prepare_job`]: submission validation and share path resolution

mod engine;
mod job_queue;
pub mod jobs;
mod priority;
mod submission;

pub use engine::{EngineConfig, TaskEngine};
pub use job_queue::{JobQueue, QueueEntry};
pub use jobs::{
    DEFAULT_SCALE, JobParams, JobState, LowresJob, MediaJob, TaskKind, ThumbnailJob,
};
pub use priority::PriorityWindow;
pub use submission::{TaskSubmission, prepare_job};
