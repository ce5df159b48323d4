//! Subprocess execution with timeout support.
//!
//! Device queries go through external tools that may block for as long as a
//! disk takes to answer; the runner bounds each call so one stuck drive
//! cannot stall the refresh loop forever.

use std::ffi::{OsStr, OsString};
use std::io;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Result of a subprocess execution with timeout.
#[derive(Debug)]
pub enum SubprocessResult {
    /// Command ran to completion, whatever its exit status.
    Completed(Output),
    /// Command did not finish within the timeout.
    Timeout,
    /// Command failed to spawn.
    SpawnError(io::Error),
}

impl SubprocessResult {
    /// Exit code, if the command completed and was not killed by a signal.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Completed(output) => output.status.code(),
            _ => None,
        }
    }

    /// Stdout as a lossy UTF-8 string if the command completed.
    #[must_use]
    pub fn stdout_string(&self) -> Option<String> {
        match self {
            Self::Completed(output) => Some(String::from_utf8_lossy(&output.stdout).into_owned()),
            _ => None,
        }
    }

    /// Returns true if command timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Runs `program` with `args`, waiting at most `timeout`.
///
/// Stdin is closed and the C locale forced so tool output is stable. The
/// blocking `output()` call runs on a worker thread; on timeout the worker is
/// left to finish on its own.
pub fn run_with_timeout<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    timeout: Duration,
) -> SubprocessResult {
    let program = program.to_string();
    let args: Vec<OsString> = args.iter().map(|a| a.as_ref().to_os_string()).collect();

    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let result = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .env("LANG", "C")
            .output();
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(output)) => SubprocessResult::Completed(output),
        Ok(Err(e)) => SubprocessResult::SpawnError(e),
        Err(mpsc::RecvTimeoutError::Timeout) => SubprocessResult::Timeout,
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            SubprocessResult::SpawnError(io::Error::other("worker thread exited"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_completed_command() {
        let result = run_with_timeout("echo", &["hello"], Duration::from_secs(2));
        assert_eq!(result.exit_code(), Some(0));
        assert_eq!(result.stdout_string().unwrap().trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_completed() {
        let result = run_with_timeout("sh", &["-c", "exit 6"], Duration::from_secs(2));
        assert_eq!(result.exit_code(), Some(6));
        assert!(result.stdout_string().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout() {
        let result = run_with_timeout("sleep", &["5"], Duration::from_millis(100));
        assert!(result.is_timeout());
        assert_eq!(result.exit_code(), None);
        assert!(result.stdout_string().is_none());
    }

    #[test]
    fn test_spawn_error() {
        let result = run_with_timeout(
            "definitely-not-a-real-binary-xyz",
            &[] as &[&str],
            Duration::from_secs(2),
        );
        assert!(matches!(result, SubprocessResult::SpawnError(_)));
    }
}
