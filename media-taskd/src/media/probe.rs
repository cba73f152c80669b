//! Media duration probing via ffprobe.

use std::path::Path;
use std::process::Stdio;

use process_utils::{SpawnError, tokio_command};
use tracing::{debug, error};

use crate::Result;

/// Extract `format.duration` from ffprobe's JSON output.
///
/// ffprobe prints the duration as a string; a bare number is accepted too.
/// Anything missing, unparseable or negative yields `0.0`.
pub fn parse_probe_duration(output: &[u8]) -> f64 {
    if output.iter().all(u8::is_ascii_whitespace) {
        return 0.0;
    }

    let value: serde_json::Value = match serde_json::from_slice(output) {
        Ok(value) => value,
        Err(e) => {
            error!(error = %e, "Failed to parse ffprobe output");
            return 0.0;
        }
    };

    let duration = match value.pointer("/format/duration") {
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        _ => None,
    };

    match duration {
        Some(d) if d.is_finite() && d > 0.0 => d,
        _ => 0.0,
    }
}

/// Probe the duration of a media file, in seconds.
///
/// Returns `Ok(0.0)` when the probe ran but the duration is unknown
/// (non-zero exit, unusable output); callers treat zero as "unusable".
/// Failing to start the probe tool at all is an error.
pub async fn probe_duration(ffprobe: &Path, media_path: &Path) -> Result<f64> {
    let output = tokio_command(ffprobe)
        .args(["-show_format", "-hide_banner", "-print_format", "json", "-v", "quiet"])
        .arg(media_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|source| SpawnError::Spawn {
            program: ffprobe.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        error!(
            media = %media_path.display(),
            exit_code = ?output.status.code(),
            "Failed to get duration: {} exited with an error",
            ffprobe.display()
        );
        return Ok(0.0);
    }

    let duration = parse_probe_duration(&output.stdout);
    debug!(media = %media_path.display(), duration, "Probed media duration");
    Ok(duration)
}
