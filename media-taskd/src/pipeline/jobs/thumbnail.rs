//! Single-frame thumbnail extraction.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use process_utils::OutputHandler;
use tracing::{debug, info, trace, warn};

use super::{JobParams, JobState, TaskKind};
use crate::Result;
use crate::media::MediaTools;
use crate::media::ffmpeg_parser::LineBuffer;
use crate::status::{StatusEvent, StatusReporter};
use crate::utils::fs::ensure_parent_dir;

/// Extracts one frame of the source, scaled, into `destination_path`.
#[derive(Debug, Clone)]
pub struct ThumbnailJob {
    task_id: String,
    source_path: PathBuf,
    destination_path: PathBuf,
    params: JobParams,
    tools: MediaTools,
    state: JobState,
}

impl ThumbnailJob {
    /// Build a job; fails if `params` do not validate.
    pub fn new(
        task_id: impl Into<String>,
        source_path: impl Into<PathBuf>,
        destination_path: impl Into<PathBuf>,
        params: Option<JobParams>,
    ) -> Result<Self> {
        let params = params.unwrap_or_default();
        params.validate()?;

        Ok(Self {
            task_id: task_id.into(),
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            params,
            tools: MediaTools::default(),
            state: JobState::Created,
        })
    }

    pub fn with_tools(mut self, tools: MediaTools) -> Self {
        self.tools = tools;
        self
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn destination_path(&self) -> &Path {
        &self.destination_path
    }

    pub fn params(&self) -> &JobParams {
        &self.params
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn set_state(&mut self, state: JobState) {
        debug!(from = %self.state, to = %state, "Job state changed");
        self.state = state;
    }

    pub fn generate_command(&self) -> Vec<OsString> {
        vec![
            self.tools.ffmpeg.clone().into_os_string(),
            "-y".into(),
            "-hide_banner".into(),
            "-i".into(),
            self.source_path.clone().into_os_string(),
            "-vframes".into(),
            "1".into(),
            "-s".into(),
            self.params.scale.clone().into(),
            self.destination_path.clone().into_os_string(),
        ]
    }

    pub async fn run(&mut self, reporter: &StatusReporter) -> Result<bool> {
        self.set_state(JobState::Running);
        reporter.report(StatusEvent::in_progress(
            &self.task_id,
            TaskKind::Thumbnail,
            0.0,
        ));

        ensure_parent_dir(&self.destination_path).await?;

        let args = self.generate_command();
        debug!(command = ?args, "Starting thumbnail extraction");

        let mut output = DiagnosticOutput::default();
        let exit_code = process_utils::spawn(&args, None, &mut output).await?;
        output.finish();

        if exit_code == 0 {
            self.set_state(JobState::Completed);
            info!(
                output = %self.destination_path.display(),
                "Thumbnail generated"
            );
            reporter.report(StatusEvent::completed(&self.task_id, TaskKind::Thumbnail));
            Ok(true)
        } else {
            self.set_state(JobState::Failed);
            warn!(
                exit_code,
                last_output = output.last_line.as_deref().unwrap_or(""),
                "Thumbnail extraction failed"
            );
            reporter.report(StatusEvent::failed(&self.task_id, TaskKind::Thumbnail));
            Ok(false)
        }
    }
}

/// Keeps ffmpeg's chatter out of the way but remembers the last line for
/// failure logs. A single frame gives no usable progress.
#[derive(Default)]
struct DiagnosticOutput {
    lines: LineBuffer,
    last_line: Option<String>,
}

impl DiagnosticOutput {
    /// Pick up the last line if the stream ended without a terminator.
    fn finish(&mut self) {
        if let Some(line) = self.lines.finish() {
            trace!(line = %line, "ffmpeg");
            self.last_line = Some(line);
        }
    }
}

impl OutputHandler for DiagnosticOutput {
    fn out_data(&mut self, data: &[u8]) {
        trace!(bytes = data.len(), "ffmpeg stdout");
    }

    fn err_data(&mut self, data: &[u8]) {
        for line in self.lines.push(data) {
            trace!(line = %line, "ffmpeg");
            self.last_line = Some(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(scale: &str) -> Result<ThumbnailJob> {
        ThumbnailJob::new(
            "thumb-1",
            "/media/in.mp4",
            "/proxy/thumb.jpg",
            Some(JobParams::with_scale(scale)),
        )
    }

    #[test]
    fn test_command_line() {
        let job = job("640:360")
            .unwrap()
            .with_tools(MediaTools::new("/usr/bin/ffmpeg", "/usr/bin/ffprobe"));
        let args: Vec<String> = job
            .generate_command()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "/usr/bin/ffmpeg", "-y", "-hide_banner", "-i", "/media/in.mp4", "-vframes", "1",
                "-s", "640:360", "/proxy/thumb.jpg",
            ]
        );
    }

    #[test]
    fn test_unterminated_error_line_is_kept() {
        let mut output = DiagnosticOutput::default();
        output.err_data(b"Input #0, mov, from 'in.mp4':\n");
        output.err_data(b"in.mp4: No such file or directory");
        assert_eq!(output.last_line.as_deref(), Some("Input #0, mov, from 'in.mp4':"));

        output.finish();
        assert_eq!(
            output.last_line.as_deref(),
            Some("in.mp4: No such file or directory")
        );
    }

    #[test]
    fn test_invalid_scale_fails_construction() {
        assert!(matches!(job("abc"), Err(crate::Error::Validation(_))));
    }

    #[cfg(unix)]
    mod run {
        use super::*;
        use crate::pipeline::jobs::test_support::write_tool;
        use crate::status::{StatusSink, TaskStatus};
        use async_trait::async_trait;
        use parking_lot::Mutex;
        use std::sync::Arc;

        #[derive(Default)]
        struct Recording(Mutex<Vec<StatusEvent>>);

        #[async_trait]
        impl StatusSink for Recording {
            async fn deliver(&self, event: &StatusEvent) -> crate::Result<()> {
                self.0.lock().push(event.clone());
                Ok(())
            }
        }

        async fn run_with(body: &str) -> (Result<bool>, ThumbnailJob, Vec<StatusEvent>) {
            let dir = tempfile::tempdir().unwrap();
            let ffmpeg = write_tool(dir.path(), "ffmpeg", body);
            let mut job = ThumbnailJob::new(
                "thumb-1",
                dir.path().join("in.mp4"),
                dir.path().join("out/thumb.jpg"),
                None,
            )
            .unwrap()
            .with_tools(MediaTools::new(ffmpeg, "ffprobe"));

            let sink = Arc::new(Recording::default());
            let (reporter, handle) = StatusReporter::spawn(sink.clone());
            let result = job.run(&reporter).await;
            drop(reporter);
            handle.await.unwrap();
            let events = sink.0.lock().clone();
            (result, job, events)
        }

        #[tokio::test]
        async fn test_success_reports_progress_then_completed() {
            let (result, job, events) = run_with("echo 'frame=1' >&2; exit 0").await;
            assert!(result.unwrap());
            assert_eq!(job.state(), JobState::Completed);

            let statuses: Vec<(TaskStatus, f64)> =
                events.iter().map(|e| (e.status, e.progress)).collect();
            assert_eq!(
                statuses,
                vec![(TaskStatus::InProgress, 0.0), (TaskStatus::Completed, 100.0)]
            );
        }

        #[tokio::test]
        async fn test_nonzero_exit_reports_failed() {
            let (result, job, events) = run_with("echo 'No such file' >&2; exit 1").await;
            assert!(!result.unwrap());
            assert_eq!(job.state(), JobState::Failed);
            assert_eq!(events.last().unwrap().status, TaskStatus::Failed);
            assert_eq!(events.last().unwrap().progress, 0.0);
            assert_eq!(events.iter().filter(|e| e.status.is_terminal()).count(), 1);
        }
    }
}
