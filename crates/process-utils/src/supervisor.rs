//! Supervision of a single external process.
//!
//! A [`ProcessRun`] owns one spawned child for the duration of one
//! invocation: it writes the optional stdin payload, forwards stdout and
//! stderr chunks to an [`OutputHandler`] as they arrive, and resolves with
//! the exit code once the child is gone. Chunks are delivered raw; a chunk
//! may hold several lines or end in the middle of one.

use std::ffi::OsStr;
use std::io;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::tokio_command;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Exit code reported when the process was terminated by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// Errors raised while supervising a process.
///
/// A process that starts and exits with a non-zero code is *not* an error;
/// its exit code is returned normally.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("empty command line")]
    EmptyCommand,

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed while waiting for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Receives the output of a supervised process.
///
/// Both methods default to discarding the data.
pub trait OutputHandler: Send {
    fn out_data(&mut self, _data: &[u8]) {}

    fn err_data(&mut self, _data: &[u8]) {}
}

/// Discards all output.
impl OutputHandler for () {}

/// One spawned process, from start to exit.
pub struct ProcessRun {
    program: String,
    pid: Option<u32>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    exit: oneshot::Receiver<io::Result<ExitStatus>>,
}

impl ProcessRun {
    /// Spawn `args[0]` with the remaining arguments.
    ///
    /// When `stdin_data` is given it is written to the child's stdin, which is
    /// closed afterwards; otherwise stdin is attached to the null device.
    pub fn start<S: AsRef<OsStr>>(
        args: &[S],
        stdin_data: Option<Vec<u8>>,
    ) -> Result<Self, SpawnError> {
        let (program, rest) = args.split_first().ok_or(SpawnError::EmptyCommand)?;
        let program_name = program.as_ref().to_string_lossy().into_owned();

        let mut cmd = tokio_command(program);
        cmd.args(rest)
            .env("LC_ALL", "C")
            .stdin(if stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| SpawnError::Spawn {
            program: program_name.clone(),
            source,
        })?;

        let pid = child.id();
        debug!(program = %program_name, pid = ?pid, "Process started");

        if let (Some(mut pipe), Some(data)) = (child.stdin.take(), stdin_data) {
            let program = program_name.clone();
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&data).await {
                    warn!(program = %program, error = %e, "Failed to write process stdin");
                }
                // Dropping the pipe closes the child's stdin.
            });
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (tx, exit) = oneshot::channel();
        tokio::spawn(async move {
            let status = child.wait().await;
            let _ = tx.send(status);
        });

        Ok(Self {
            program: program_name,
            pid,
            stdout,
            stderr,
            exit,
        })
    }

    /// Forward output to `handler` until both pipes close, then wait for exit.
    pub async fn supervise<H>(mut self, handler: &mut H) -> Result<i32, SpawnError>
    where
        H: OutputHandler + ?Sized,
    {
        let mut out_buf = vec![0u8; READ_CHUNK_SIZE];
        let mut err_buf = vec![0u8; READ_CHUNK_SIZE];

        while self.stdout.is_some() || self.stderr.is_some() {
            tokio::select! {
                read = read_chunk(&mut self.stdout, &mut out_buf), if self.stdout.is_some() => {
                    match read {
                        Ok(0) => self.stdout = None,
                        Ok(n) => handler.out_data(&out_buf[..n]),
                        Err(e) => {
                            warn!(program = %self.program, error = %e, "Failed to read process stdout");
                            self.stdout = None;
                        }
                    }
                }
                read = read_chunk(&mut self.stderr, &mut err_buf), if self.stderr.is_some() => {
                    match read {
                        Ok(0) => self.stderr = None,
                        Ok(n) => handler.err_data(&err_buf[..n]),
                        Err(e) => {
                            warn!(program = %self.program, error = %e, "Failed to read process stderr");
                            self.stderr = None;
                        }
                    }
                }
            }
        }

        let status = match self.exit.await {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                error!(program = %self.program, error = %source, "Error waiting for process");
                return Err(SpawnError::Wait {
                    program: self.program,
                    source,
                });
            }
            Err(_) => {
                return Err(SpawnError::Wait {
                    program: self.program,
                    source: io::Error::other("process waiter dropped"),
                });
            }
        };

        let code = match status.code() {
            Some(code) => code,
            None => {
                warn!(program = %self.program, "Process terminated by signal");
                SIGNAL_EXIT_CODE
            }
        };

        debug!(program = %self.program, pid = ?self.pid, exit_code = code, "Process exited");
        Ok(code)
    }
}

async fn read_chunk<R>(pipe: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match pipe {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Run one command to completion and return its exit code.
///
/// Suspends the caller until the process exits. Failing to start the
/// process is reported as [`SpawnError::Spawn`], never as an exit code.
pub async fn spawn<S, H>(
    args: &[S],
    stdin_data: Option<Vec<u8>>,
    handler: &mut H,
) -> Result<i32, SpawnError>
where
    S: AsRef<OsStr>,
    H: OutputHandler + ?Sized,
{
    ProcessRun::start(args, stdin_data)?.supervise(handler).await
}
