//! Process helpers shared across the workspace.
//!
//! - [`supervisor`] spawns one external command, feeds its stdin and hands
//!   raw stdout/stderr chunks to an [`OutputHandler`] until it exits.
//! - [`NoWindowExt`] / [`tokio_command`] keep child processes from opening a
//!   console window on Windows.

use std::ffi::OsStr;

#[cfg(feature = "tokio")]
pub mod supervisor;

#[cfg(feature = "tokio")]
pub use supervisor::{OutputHandler, ProcessRun, SpawnError, spawn};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
///
/// The child is killed if its handle is dropped before it exits, so work
/// abandoned at shutdown does not leave orphaned processes behind.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.kill_on_drop(true);
    cmd
}
