//! Turning task submissions into jobs.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::jobs::{JobParams, LowresJob, MediaJob, TaskKind, ThumbnailJob};
use super::priority::PriorityWindow;
use crate::media::MediaTools;
use crate::shares::{ShareDetails, ShareResolver, resolve_share_uri};
use crate::{Error, Result};

/// A task description as posted by the request server.
///
/// Paths are `share://` URIs relative to `share_id` (the source) and
/// `proxy_share_id` (the generated artifact).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    #[serde(default)]
    pub task_name: String,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub media_path: Option<String>,
    #[serde(default)]
    pub share_id: Option<String>,
    #[serde(default)]
    pub proxy_share_id: Option<String>,
    #[serde(default)]
    pub thumbnail_path: Option<String>,
    #[serde(default)]
    pub lowres_path: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub params: Option<JobParams>,
}

impl TaskSubmission {
    /// The submitted `task_name` as a job kind.
    pub fn kind(&self) -> Result<TaskKind> {
        if self.task_name.trim().is_empty() || self.task_id.trim().is_empty() {
            return Err(Error::validation("invalid task information provided"));
        }
        self.task_name
            .parse()
            .map_err(|_| Error::validation(format!("unsupported task_name '{}'", self.task_name)))
    }

    /// Priority to queue at: the requested one, or the default for the kind.
    ///
    /// Thumbnails are cheap and default to one step more urgent than other
    /// work.
    pub fn effective_priority(&self, kind: TaskKind, window: &PriorityWindow) -> i32 {
        self.priority.unwrap_or_else(|| match kind {
            TaskKind::Thumbnail => window.relative_to_default(-1),
            TaskKind::Lowres => window.default,
        })
    }

    fn output_path(&self, kind: TaskKind) -> Option<&str> {
        match kind {
            TaskKind::Thumbnail => self.thumbnail_path.as_deref(),
            TaskKind::Lowres => self.lowres_path.as_deref(),
        }
    }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::validation(format!("'{key}' not provided")))
}

async fn fetch_share(
    resolver: &dyn ShareResolver,
    share_id: &str,
    role: &str,
) -> Result<ShareDetails> {
    resolver
        .get_share_details(share_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("{role} storage"), share_id))
}

/// Validate a submission, resolve its paths and build the job.
///
/// Every failure here is a precondition failure except for errors talking
/// to the share resolver itself.
pub async fn prepare_job(
    submission: &TaskSubmission,
    resolver: &dyn ShareResolver,
    tools: &MediaTools,
) -> Result<MediaJob> {
    let kind = submission.kind()?;
    let output_key = match kind {
        TaskKind::Thumbnail => "thumbnail_path",
        TaskKind::Lowres => "lowres_path",
    };

    let media_uri = required(submission.media_path.as_deref(), "media_path")?;
    let output_uri = required(submission.output_path(kind), output_key)?;
    let share_id = required(submission.share_id.as_deref(), "share_id")?;
    let proxy_share_id = required(submission.proxy_share_id.as_deref(), "proxy_share_id")?;

    // Fail on bad parameters before any network round trip.
    let params = submission.params.clone().unwrap_or_default();
    params.validate()?;

    let media_share = fetch_share(resolver, share_id, "media").await?;
    let source_path = resolve_share_uri(media_uri, &media_share)?;

    let proxy_share = fetch_share(resolver, proxy_share_id, "proxy").await?;
    let destination_path = resolve_share_uri(output_uri, &proxy_share)?;

    debug!(
        task_id = %submission.task_id,
        task_name = %kind,
        source = %source_path.display(),
        destination = %destination_path.display(),
        "Resolved task paths"
    );

    let job: MediaJob = match kind {
        TaskKind::Thumbnail => ThumbnailJob::new(
            submission.task_id.clone(),
            source_path,
            destination_path,
            Some(params),
        )?
        .into(),
        TaskKind::Lowres => LowresJob::new(
            submission.task_id.clone(),
            source_path,
            destination_path,
            Some(params),
        )?
        .into(),
    };

    Ok(job.with_tools(tools.clone()))
}
