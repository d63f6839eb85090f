//! Scripted process handles for exercising the runtime without real children

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::runtime::process::{ProcessHandle, ProcessState, Spawner};

/// How a fake process reacts to termination requests
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Exits this long after a terminate signal
    ExitOnTerminate(Duration),
    /// Ignores terminate, dies on kill
    ExitOnKill,
    /// Survives both
    Unkillable,
    /// Exits on its own this long after spawning
    ExitAfter(Duration),
    /// Status polls fail once terminate was sent
    LostOnTerminate,
}

#[derive(Debug, Default)]
pub struct Calls {
    pub terminate: u32,
    pub kill: u32,
}

pub struct FakeProcess {
    pid: u32,
    behavior: Behavior,
    exit_at: Option<Instant>,
    lost: bool,
    calls: Arc<Mutex<Calls>>,
}

impl FakeProcess {
    pub fn new(pid: u32, behavior: Behavior) -> (Self, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let exit_at = match behavior {
            Behavior::ExitAfter(after) => Some(Instant::now() + after),
            _ => None,
        };
        let process = Self {
            pid,
            behavior,
            exit_at,
            lost: false,
            calls: calls.clone(),
        };
        (process, calls)
    }

    pub fn boxed(pid: u32, behavior: Behavior) -> Box<dyn ProcessHandle> {
        Box::new(Self::new(pid, behavior).0)
    }

    fn exit_no_later_than(&mut self, at: Instant) {
        self.exit_at = Some(self.exit_at.map_or(at, |t| t.min(at)));
    }
}

impl ProcessHandle for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn poll(&mut self) -> io::Result<ProcessState> {
        if self.lost {
            return Err(io::Error::other("status unavailable"));
        }
        match self.exit_at {
            Some(at) if Instant::now() >= at => Ok(ProcessState::Exited(Some(0))),
            _ => Ok(ProcessState::Running),
        }
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.calls.lock().unwrap().terminate += 1;
        match self.behavior {
            Behavior::ExitOnTerminate(after) => self.exit_no_later_than(Instant::now() + after),
            Behavior::LostOnTerminate => self.lost = true,
            _ => {}
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.calls.lock().unwrap().kill += 1;
        match self.behavior {
            Behavior::Unkillable => {}
            _ => self.exit_no_later_than(Instant::now()),
        }
        Ok(())
    }
}

/// Records spawn order and virtual spawn times
pub struct FakeSpawner {
    behavior: Behavior,
    failing: HashSet<PathBuf>,
    next_pid: AtomicU32,
    pub spawned: Arc<Mutex<Vec<(PathBuf, Instant)>>>,
}

impl FakeSpawner {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            failing: HashSet::new(),
            next_pid: AtomicU32::new(1000),
            spawned: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Spawning `path` fails with permission denied
    pub fn failing(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing.insert(path.into());
        self
    }

    pub fn spawned_paths(&self) -> Vec<PathBuf> {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn spawn_times(&self) -> Vec<Instant> {
        self.spawned.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

impl Spawner for FakeSpawner {
    fn spawn(
        &self,
        program: &Path,
        _working_dir: Option<&Path>,
    ) -> io::Result<Box<dyn ProcessHandle>> {
        if self.failing.contains(program) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "permission denied",
            ));
        }
        self.spawned
            .lock()
            .unwrap()
            .push((program.to_path_buf(), Instant::now()));
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        Ok(FakeProcess::boxed(pid, self.behavior))
    }
}
