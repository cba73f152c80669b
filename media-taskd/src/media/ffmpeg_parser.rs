//! FFmpeg output parsing utilities.
//!
//! FFmpeg reports transcoding progress on stderr as lines like
//! `frame=  100 fps=25 q=-1.0 size=    1024kB time=00:00:04.00 bitrate=2097.2kbits/s speed=1.00x`,
//! separated by `\r` while a line is being refreshed. Everything else it
//! prints there (banner, stream mapping, warnings) is ignored.

/// Values extracted from one progress line.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FfmpegProgress {
    /// Position in the output, in seconds.
    pub time_secs: f64,
    /// Output bitrate in bytes per second, if reported.
    pub bitrate_bytes_per_sec: Option<u64>,
    /// Output size in bytes, if reported.
    pub size_bytes: Option<u64>,
    /// Speed relative to realtime, if reported.
    pub speed: Option<f64>,
}

/// Parse time string in `HH:MM:SS[.ms]` format to seconds.
///
/// ```ignore
/// assert_eq!(parse_time("00:00:10.50"), Some(10.5));
/// assert_eq!(parse_time("01:30:00"), Some(5400.0));
/// assert_eq!(parse_time("invalid"), None);
/// ```
pub fn parse_time(time_str: &str) -> Option<f64> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    // `-00` parses as negative zero, so test the sign bit rather than `< 0.0`.
    if [hours, minutes, seconds]
        .iter()
        .any(|v| v.is_sign_negative() || !v.is_finite())
    {
        return None;
    }

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Value following `key=`, with the padding ffmpeg puts after `=` skipped.
fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let start = line.find(key)? + key.len();
    let rest = line[start..].trim_start();
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Parse size field (e.g. `size=    1024kB`) into bytes.
pub fn parse_size(line: &str) -> Option<u64> {
    let value = field(line, "size=")?;
    let end = value.find(['k', 'K'])?;
    let size: u64 = value[..end].trim().parse().ok()?;
    size.checked_mul(1024)
}

/// Parse speed multiplier (e.g. `speed=1.00x`).
pub fn parse_speed(line: &str) -> Option<f64> {
    let value = field(line, "speed=")?;
    let end = value.find('x')?;
    value[..end].trim().parse().ok()
}

/// Parse bitrate (e.g. `bitrate=2097.2kbits/s`) into bytes per second.
pub fn parse_bitrate(line: &str) -> Option<u64> {
    let value = field(line, "bitrate=")?;
    let end = value.find("kbits/s")?;
    let bitrate: f64 = value[..end].trim().parse().ok()?;
    Some((bitrate * 1024.0 / 8.0) as u64)
}

/// Parse time field (e.g. `time=00:01:30.50`) into seconds.
pub fn parse_time_field(line: &str) -> Option<f64> {
    parse_time(field(line, "time=")?)
}

/// Parse one FFmpeg progress line.
///
/// A line counts as progress when it carries `time=` together with
/// `frame=` or `size=`; audio-only outputs omit `frame=`. Lines whose time
/// is `N/A` or otherwise unparseable yield `None`.
pub fn parse_progress(line: &str) -> Option<FfmpegProgress> {
    let line = line.trim();
    if !line.contains("time=") || !(line.contains("frame=") || line.contains("size=")) {
        return None;
    }

    Some(FfmpegProgress {
        time_secs: parse_time_field(line)?,
        bitrate_bytes_per_sec: parse_bitrate(line),
        size_bytes: parse_size(line),
        speed: parse_speed(line),
    })
}

/// Longest line kept before it is emitted without a terminator.
pub const MAX_LINE_LEN: usize = 16 * 1024;

/// Splits a byte stream into lines terminated by `\n` or `\r`.
///
/// Process output arrives in arbitrary chunks; incomplete trailing data is
/// kept until the rest of the line arrives, the line reaches
/// [`MAX_LINE_LEN`], or [`finish`](Self::finish) is called at end of stream.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if !self.pending.is_empty() {
                    lines.push(self.take_pending());
                }
            } else {
                self.pending.push(byte);
                if self.pending.len() >= MAX_LINE_LEN {
                    lines.push(self.take_pending());
                }
            }
        }
        lines
    }

    /// Return the unterminated tail, if any, once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        (!self.pending.is_empty()).then(|| self.take_pending())
    }

    fn take_pending(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }

    /// Bytes received after the last line terminator.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}
