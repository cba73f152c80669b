//! Media jobs run by the engine.
//!
//! Each job owns its command line, the parsing of its process output and
//! the status events it emits. Jobs are built once from a validated
//! submission and consumed by [`MediaJob::run`].

mod lowres;
mod thumbnail;

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::media::MediaTools;
use crate::status::StatusReporter;
use crate::{Error, Result};

pub use lowres::LowresJob;
pub use thumbnail::ThumbnailJob;

/// Default output scale, `width:height` in pixels.
pub const DEFAULT_SCALE: &str = "320:240";

/// Closed set of job kinds; the wire names are the submission `task_name`s.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum TaskKind {
    #[serde(rename = "generate_thumbnail")]
    #[strum(serialize = "generate_thumbnail")]
    Thumbnail,
    #[serde(rename = "generate_lowres")]
    #[strum(serialize = "generate_lowres")]
    Lowres,
}

/// Lifecycle of one job run. Thumbnails skip `Probing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Created,
    Probing,
    Running,
    Completed,
    Failed,
}

fn default_scale() -> String {
    DEFAULT_SCALE.to_string()
}

fn scale_regex() -> &'static Regex {
    static SCALE_RE: OnceLock<Regex> = OnceLock::new();
    SCALE_RE.get_or_init(|| Regex::new(r"^[0-9]+:[0-9]+$").expect("scale pattern is valid"))
}

/// Tunable job parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    /// Output scale as `width:height`.
    #[serde(default = "default_scale")]
    pub scale: String,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            scale: default_scale(),
        }
    }
}

impl JobParams {
    pub fn with_scale(scale: impl Into<String>) -> Self {
        Self {
            scale: scale.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !scale_regex().is_match(&self.scale) {
            return Err(Error::validation(format!(
                "invalid scale {:?}: expected WIDTH:HEIGHT in pixels",
                self.scale
            )));
        }
        Ok(())
    }
}

/// A job of any kind.
#[derive(Debug, Clone)]
pub enum MediaJob {
    Thumbnail(ThumbnailJob),
    Lowres(LowresJob),
}

impl MediaJob {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Thumbnail(_) => TaskKind::Thumbnail,
            Self::Lowres(_) => TaskKind::Lowres,
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Self::Thumbnail(job) => job.task_id(),
            Self::Lowres(job) => job.task_id(),
        }
    }

    pub fn source_path(&self) -> &Path {
        match self {
            Self::Thumbnail(job) => job.source_path(),
            Self::Lowres(job) => job.source_path(),
        }
    }

    pub fn destination_path(&self) -> &Path {
        match self {
            Self::Thumbnail(job) => job.destination_path(),
            Self::Lowres(job) => job.destination_path(),
        }
    }

    pub fn state(&self) -> JobState {
        match self {
            Self::Thumbnail(job) => job.state(),
            Self::Lowres(job) => job.state(),
        }
    }

    /// Replace the external tool locations.
    pub fn with_tools(self, tools: MediaTools) -> Self {
        match self {
            Self::Thumbnail(job) => Self::Thumbnail(job.with_tools(tools)),
            Self::Lowres(job) => Self::Lowres(job.with_tools(tools)),
        }
    }

    pub fn generate_command(&self) -> Vec<std::ffi::OsString> {
        match self {
            Self::Thumbnail(job) => job.generate_command(),
            Self::Lowres(job) => job.generate_command(),
        }
    }

    /// Run the job to a terminal state.
    ///
    /// `Ok(true)` / `Ok(false)` mean the job completed or failed and the
    /// terminal event was reported. `Err` means the job could not be carried
    /// out (the transcoder could not be started, for example) and no terminal
    /// event has been reported yet.
    pub async fn run(&mut self, reporter: &StatusReporter) -> Result<bool> {
        match self {
            Self::Thumbnail(job) => job.run(reporter).await,
            Self::Lowres(job) => job.run(reporter).await,
        }
    }
}

impl From<ThumbnailJob> for MediaJob {
    fn from(job: ThumbnailJob) -> Self {
        Self::Thumbnail(job)
    }
}

impl From<LowresJob> for MediaJob {
    fn from(job: LowresJob) -> Self {
        Self::Lowres(job)
    }
}

#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Write an executable shell script named `name` into `dir`.
    pub fn write_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
