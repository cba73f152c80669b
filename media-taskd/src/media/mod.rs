//! External media tooling: locations of the ffmpeg binaries, duration
//! probing and parsing of ffmpeg's human-readable progress output.

pub mod ffmpeg_parser;
mod probe;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use probe::{parse_probe_duration, probe_duration};

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

/// Paths of the external tools used by jobs.
///
/// Defaults resolve through `PATH`; `FFMPEG_PATH` / `FFPROBE_PATH` override
/// them via [`AppConfig`](crate::config::AppConfig). Absence of a tool is only
/// discovered when a job tries to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTools {
    /// Transcoder binary.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    /// Probe binary.
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

impl MediaTools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }
}

impl Default for MediaTools {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}
