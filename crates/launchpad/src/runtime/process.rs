//! OS process handles and the spawn facility

use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Observed state of a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Exit status still pending
    Running,
    /// Process has exited with exit code (None when killed by a signal)
    Exited(Option<i32>),
}

impl ProcessState {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running)
    }
}

/// Handle to one spawned process.
///
/// Every operation is non-blocking; callers poll for exit.
pub trait ProcessHandle: Send {
    /// OS process ID, if still known
    fn id(&self) -> Option<u32>;

    /// Poll for exit without waiting
    fn poll(&mut self) -> io::Result<ProcessState>;

    /// Ask the process to exit (SIGTERM on Unix)
    fn terminate(&mut self) -> io::Result<()>;

    /// Force the process to exit
    fn kill(&mut self) -> io::Result<()>;
}

/// Creates child processes for entries
pub trait Spawner: Send + Sync {
    fn spawn(&self, program: &Path, working_dir: Option<&Path>)
        -> io::Result<Box<dyn ProcessHandle>>;
}

/// Spawns real, detached OS processes.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSpawner;

impl Spawner for OsSpawner {
    fn spawn(
        &self,
        program: &Path,
        working_dir: Option<&Path>,
    ) -> io::Result<Box<dyn ProcessHandle>> {
        let mut cmd = Command::new(program);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        // Keep terminal signals (Ctrl+C) aimed at the launcher away from children
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let pid = child.id();
        log::debug!("Spawned {} (PID: {:?})", program.display(), pid);
        Ok(Box::new(OsProcess { child, pid }))
    }
}

/// A real child process
pub struct OsProcess {
    child: Child,
    /// Spawn-time PID, still reported after the child is reaped
    pid: Option<u32>,
}

impl ProcessHandle for OsProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn poll(&mut self) -> io::Result<ProcessState> {
        match self.child.try_wait()? {
            Some(status) => Ok(ProcessState::Exited(status.code())),
            None => Ok(ProcessState::Running),
        }
    }

    fn terminate(&mut self) -> io::Result<()> {
        // Already reaped; the PID may belong to someone else by now
        if self.child.id().is_none() {
            return Ok(());
        }

        #[cfg(unix)]
        return match self.pid {
            Some(pid) => send_sigterm(pid),
            None => Ok(()),
        };

        // No cooperative stop signal; TerminateProcess is the best available
        #[cfg(not(unix))]
        return self.child.start_kill();
    }

    fn kill(&mut self) -> io::Result<()> {
        #[cfg(windows)]
        {
            if let Some(pid) = self.child.id() {
                let status = std::process::Command::new("taskkill")
                    .args(["/F", "/PID", &pid.to_string()])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
                if matches!(status, Ok(s) if s.success()) {
                    return Ok(());
                }
            }
        }

        match self.child.start_kill() {
            Ok(()) => Ok(()),
            // Already exited and reaped
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from)
}

/// Errors that can occur with launched processes
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Process '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Failed to spawn process '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Program path does not exist: {0}")]
    InvalidPath(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_state() {
        assert!(ProcessState::Running.is_running());
        assert!(!ProcessState::Exited(Some(0)).is_running());
        assert!(!ProcessState::Exited(None).is_running());
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let result = OsSpawner.spawn(Path::new("/definitely/not/a/program"), None);
        assert!(result.is_err());
    }
}
