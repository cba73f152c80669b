//! Low-resolution proxy transcoding.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use process_utils::OutputHandler;
use tracing::{debug, error, info, trace, warn};

use super::{JobParams, JobState, TaskKind};
use crate::Result;
use crate::media::ffmpeg_parser::{LineBuffer, parse_progress};
use crate::media::{MediaTools, probe_duration};
use crate::status::{StatusEvent, StatusReporter};
use crate::utils::fs::ensure_parent_dir;

/// Transcodes the whole source at a reduced scale into `destination_path`.
///
/// Progress is derived from the `time=` position ffmpeg prints on stderr,
/// relative to the duration probed before the transcode starts.
#[derive(Debug, Clone)]
pub struct LowresJob {
    task_id: String,
    source_path: PathBuf,
    destination_path: PathBuf,
    params: JobParams,
    tools: MediaTools,
    state: JobState,
    duration: Option<f64>,
}

impl LowresJob {
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
            duration: None,
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

    /// Probed source duration in seconds, once the run has probed it.
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn generate_command(&self) -> Vec<OsString> {
        vec![
            self.tools.ffmpeg.clone().into_os_string(),
            "-y".into(),
            "-hide_banner".into(),
            "-i".into(),
            self.source_path.clone().into_os_string(),
            "-vf".into(),
            format!("scale={}", self.params.scale).into(),
            self.destination_path.clone().into_os_string(),
        ]
    }

    pub async fn run(&mut self, reporter: &StatusReporter) -> Result<bool> {
        self.set_state(JobState::Probing);
        let duration = probe_duration(&self.tools.ffprobe, &self.source_path).await?;
        self.duration = Some(duration);

        if duration <= 0.0 {
            self.set_state(JobState::Failed);
            error!(
                source = %self.source_path.display(),
                "Unable to determine media duration, not transcoding"
            );
            reporter.report(StatusEvent::failed(&self.task_id, TaskKind::Lowres));
            return Ok(false);
        }

        self.set_state(JobState::Running);
        ensure_parent_dir(&self.destination_path).await?;

        let args = self.generate_command();
        debug!(command = ?args, duration, "Starting lowres transcode");

        let task_id = self.task_id.clone();
        let mut output = ProgressOutput::new(&task_id, duration, reporter);
        let exit_code = process_utils::spawn(&args, None, &mut output).await?;
        output.finish();

        if exit_code == 0 {
            self.set_state(JobState::Completed);
            info!(output = %self.destination_path.display(), "Lowres generated");
            reporter.report(StatusEvent::completed(&self.task_id, TaskKind::Lowres));
            Ok(true)
        } else {
            self.set_state(JobState::Failed);
            warn!(
                exit_code,
                last_progress = output.last_progress,
                last_output = output.last_line.as_deref().unwrap_or(""),
                "Lowres transcode failed"
            );
            reporter.report(StatusEvent::failed(&self.task_id, TaskKind::Lowres));
            Ok(false)
        }
    }
}

/// Percentage of `elapsed` over `duration`, rounded to two decimals and
/// clamped to `[0, 100]`.
pub(crate) fn progress_percent(elapsed: f64, duration: f64) -> Option<f64> {
    if duration <= 0.0 || !elapsed.is_finite() {
        return None;
    }
    let percent = (elapsed / duration * 100.0).clamp(0.0, 100.0);
    Some((percent * 100.0).round() / 100.0)
}

/// Turns ffmpeg progress lines into INPROGRESS events.
struct ProgressOutput<'a> {
    task_id: &'a str,
    duration: f64,
    reporter: &'a StatusReporter,
    lines: LineBuffer,
    last_progress: f64,
    last_line: Option<String>,
}

impl<'a> ProgressOutput<'a> {
    fn new(task_id: &'a str, duration: f64, reporter: &'a StatusReporter) -> Self {
        Self {
            task_id,
            duration,
            reporter,
            lines: LineBuffer::new(),
            last_progress: 0.0,
            last_line: None,
        }
    }

    fn handle_line(&mut self, line: String) {
        let Some(progress) = parse_progress(&line) else {
            trace!(line = %line, "ffmpeg");
            self.last_line = Some(line);
            return;
        };
        let Some(percent) = progress_percent(progress.time_secs, self.duration) else {
            return;
        };
        // ffmpeg can briefly report an earlier position; keep the series monotonic.
        if percent < self.last_progress {
            return;
        }
        self.last_progress = percent;

        self.reporter.report(
            StatusEvent::in_progress(self.task_id, TaskKind::Lowres, percent)
                .with_bandwidth(progress.bitrate_bytes_per_sec),
        );
    }

    /// Handle a final line that ended without a terminator.
    fn finish(&mut self) {
        if let Some(line) = self.lines.finish() {
            self.handle_line(line);
        }
    }
}

impl OutputHandler for ProgressOutput<'_> {
    fn out_data(&mut self, data: &[u8]) {
        trace!(bytes = data.len(), "ffmpeg stdout");
    }

    fn err_data(&mut self, data: &[u8]) {
        for line in self.lines.push(data) {
            self.handle_line(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_command_line() {
        let job = LowresJob::new("low-1", "/media/in.mov", "/proxy/low.mp4", None)
            .unwrap()
            .with_tools(MediaTools::new("/opt/ffmpeg", "/opt/ffprobe"));
        let args: Vec<String> = job
            .generate_command()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "/opt/ffmpeg", "-y", "-hide_banner", "-i", "/media/in.mov", "-vf",
                "scale=320:240", "/proxy/low.mp4",
            ]
        );
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(4.0, 10.0), Some(40.0));
        assert_eq!(progress_percent(1.0, 3.0), Some(33.33));
        assert_eq!(progress_percent(2.0, 3.0), Some(66.67));
        assert_eq!(progress_percent(12.0, 10.0), Some(100.0));
        assert_eq!(progress_percent(1.0, 0.0), None);
    }

    #[test]
    fn test_progress_is_monotonic_and_ignores_noise() {
        // A reporter whose channel we can drain directly.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = StatusReporter::from_sender(tx);
        let mut output = ProgressOutput::new("low-1", 10.0, &reporter);

        output.err_data(b"Input #0, mov,mp4, from 'in.mov':\n  Duration: 00:00:10.00\n");
        output.err_data(b"frame=  25 fps=25 size=  256kB time=00:00:01.00 bitrate=2048.0kbits/s\r");
        output.err_data(b"frame=  50 fps=25 size=  512kB time=00:00:0");
        output.err_data(b"2.50 bitrate=2048.0kbits/s\r");
        output.err_data(b"frame=  40 fps=25 size=  512kB time=00:00:02.00 bitrate=2048.0kbits/s\r");
        output.err_data(b"frame=   0 fps=0 size=0kB time=N/A bitrate=N/A\r");
        output.err_data(b"garbage line\n");

        let mut progress = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.task_name, TaskKind::Lowres);
            assert_eq!(event.bandwidth, Some(262_144));
            progress.push(event.progress);
        }
        assert_eq!(progress, vec![10.0, 25.0]);
        assert_eq!(output.last_line.as_deref(), Some("garbage line"));
    }

    #[test]
    fn test_negative_time_is_not_progress() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = StatusReporter::from_sender(tx);
        let mut output = ProgressOutput::new("low-1", 10.0, &reporter);

        output.err_data(b"frame=   0 fps=0 size=   0kB time=-00:00:05.00 bitrate=N/A\r");
        output.err_data(b"frame=  25 fps=25 size=  256kB time=00:00:01.00 bitrate=2048.0kbits/s\r");
        output.err_data(b"frame=  50 fps=25 size=  512kB time=00:00:02.00 bitrate=2048.0kbits/s");
        output.finish();

        let mut progress = Vec::new();
        while let Ok(event) = rx.try_recv() {
            progress.push(event.progress);
        }
        assert_eq!(progress, vec![10.0, 20.0]);
    }

    #[test]
    fn test_unterminated_error_line_is_kept() {
        let reporter = StatusReporter::noop();
        let mut output = ProgressOutput::new("low-1", 10.0, &reporter);

        output.err_data(b"frame=  25 fps=25 size=  256kB time=00:00:01.00 bitrate=2048.0kbits/s\r");
        output.err_data(b"Conversion failed!");
        assert_eq!(output.last_line, None);

        output.finish();
        assert_eq!(output.last_line.as_deref(), Some("Conversion failed!"));
    }

    #[cfg(unix)]
    mod run {
        use super::*;
        use crate::pipeline::jobs::test_support::write_tool;
        use crate::status::TaskStatus;

        struct Outcome {
            ok: bool,
            job: LowresJob,
            events: Vec<StatusEvent>,
            transcoder_ran: bool,
        }

        async fn run_job(probe_body: &str, ffmpeg_body: &str) -> Outcome {
            let dir = tempfile::tempdir().unwrap();
            let ffprobe = write_tool(dir.path(), "ffprobe", probe_body);
            let marker = dir.path().join("ffmpeg-ran");
            let ffmpeg = write_tool(
                dir.path(),
                "ffmpeg",
                &format!("touch '{}'\n{ffmpeg_body}", marker.display()),
            );

            let mut job = LowresJob::new(
                "low-1",
                dir.path().join("in.mov"),
                dir.path().join("proxy/low.mp4"),
                None,
            )
            .unwrap()
            .with_tools(MediaTools::new(ffmpeg, ffprobe));

            let (tx, mut rx) = mpsc::unbounded_channel();
            let reporter = StatusReporter::from_sender(tx);
            let ok = job.run(&reporter).await.unwrap();

            let mut events = Vec::new();
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
            Outcome {
                ok,
                job,
                events,
                transcoder_ran: marker.exists(),
            }
        }

        #[tokio::test]
        async fn test_zero_duration_fails_without_transcoding() {
            let outcome = run_job("echo '{}'", "exit 0").await;
            assert!(!outcome.ok);
            assert!(!outcome.transcoder_ran);
            assert_eq!(outcome.job.state(), JobState::Failed);
            assert_eq!(outcome.events.len(), 1);
            assert_eq!(outcome.events[0].status, TaskStatus::Failed);
        }

        #[tokio::test]
        async fn test_progress_then_completed() {
            let Outcome {
                ok, job, events, ..
            } = run_job(
                r#"echo '{"format": {"duration": "8.000000"}}'"#,
                "printf 'frame=1 size=1kB time=00:00:02.00 bitrate=8.0kbits/s\\r' >&2\n\
                 printf 'frame=2 size=2kB time=00:00:06.00 bitrate=8.0kbits/s\\r' >&2\n\
                 exit 0",
            )
            .await;

            assert!(ok);
            assert_eq!(job.state(), JobState::Completed);
            assert_eq!(job.duration(), Some(8.0));
            let series: Vec<(TaskStatus, f64)> =
                events.iter().map(|e| (e.status, e.progress)).collect();
            assert_eq!(
                series,
                vec![
                    (TaskStatus::InProgress, 25.0),
                    (TaskStatus::InProgress, 75.0),
                    (TaskStatus::Completed, 100.0),
                ]
            );
        }

        #[tokio::test]
        async fn test_nonzero_exit_reports_failed_once() {
            let Outcome {
                ok,
                events,
                transcoder_ran,
                ..
            } = run_job(
                r#"echo '{"format": {"duration": "8.0"}}'"#,
                "echo 'Invalid data found when processing input' >&2; exit 1",
            )
            .await;
            assert!(!ok);
            assert!(transcoder_ran);
            let terminal: Vec<_> = events.iter().filter(|e| e.status.is_terminal()).collect();
            assert_eq!(terminal.len(), 1);
            assert_eq!(terminal[0].status, TaskStatus::Failed);
            assert_eq!(terminal[0].progress, 0.0);
        }
    }
}
