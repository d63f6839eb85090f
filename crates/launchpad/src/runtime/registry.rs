//! Registry of launched processes, keyed by executable path
//!
//! The registry is the single source of truth for "is this program running".
//! `track` and `untrack` are idempotent so the exit monitor and explicit
//! closes can race on the same path without further coordination.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::runtime::entry::EntryStatus;
use crate::runtime::events::{EventBus, LaunchEvent, Severity, STATUS_DURATION_MS};
use crate::runtime::process::{ProcessHandle, ProcessState};

/// Registry timing configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Time a process gets to exit after the graceful terminate signal
    pub grace_period: Duration,
    /// Time a process gets to disappear after a forced kill
    pub kill_timeout: Duration,
    /// Poll step while waiting for exit
    pub poll_step: Duration,
    /// Interval of the background exit monitor
    pub monitor_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(500),
            kill_timeout: Duration::from_millis(500),
            poll_step: Duration::from_millis(50),
            monitor_interval: Duration::from_millis(500),
        }
    }
}

struct TrackedProcess {
    name: String,
    handle: Box<dyn ProcessHandle>,
}

/// A live process as seen by presenters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningProcess {
    pub path: PathBuf,
    pub name: String,
    pub pid: Option<u32>,
}

/// Result of closing one process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Exit confirmed, no longer tracked
    Closed,
    /// Nothing live was tracked under the path
    NotRunning,
    /// Survived terminate and kill, still tracked
    Failed,
}

/// Result of `close_all`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseSummary {
    pub closed_count: usize,
    /// Display names of processes that could not be stopped
    pub failed: Vec<String>,
}

/// Path-keyed map of launched processes
#[derive(Clone)]
pub struct ProcessRegistry {
    processes: Arc<Mutex<IndexMap<PathBuf, TrackedProcess>>>,
    events: EventBus,
    config: RegistryConfig,
}

impl ProcessRegistry {
    pub fn new(events: EventBus) -> Self {
        Self::with_config(events, RegistryConfig::default())
    }

    pub fn with_config(events: EventBus, config: RegistryConfig) -> Self {
        Self {
            processes: Arc::new(Mutex::new(IndexMap::new())),
            events,
            config,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<PathBuf, TrackedProcess>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `handle` under `path`, replacing whatever was tracked there
    pub fn track(
        &self,
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        handle: Box<dyn ProcessHandle>,
    ) {
        let path = path.into();
        let name = name.into();
        log::info!("[{}] Tracking: {} (PID: {:?})", name, path.display(), handle.id());

        let replaced = self
            .lock()
            .insert(path.clone(), TrackedProcess { name, handle });
        if let Some(old) = replaced {
            log::debug!(
                "[{}] Replaced previous handle for {} (PID: {:?})",
                old.name,
                path.display(),
                old.handle.id()
            );
        }

        self.events.publish(LaunchEvent::ProcessListChanged);
    }

    /// Stop tracking `path`. Returns whether anything was removed.
    ///
    /// The entry behind the path goes back to `Ready`.
    pub fn untrack(&self, path: &Path) -> bool {
        let removed = self.lock().shift_remove(path);
        match removed {
            Some(tracked) => {
                log::info!("[{}] Untracking: {}", tracked.name, path.display());
                self.events.publish(LaunchEvent::ProcessListChanged);
                self.events.publish(LaunchEvent::EntryStatusChanged {
                    name: tracked.name,
                    path: path.to_path_buf(),
                    status: EntryStatus::Ready,
                });
                true
            }
            None => false,
        }
    }

    /// True iff a handle is tracked under `path` and has not exited
    pub fn is_running(&self, path: &Path) -> bool {
        let mut processes = self.lock();
        match processes.get_mut(path) {
            Some(tracked) => poll_running(tracked),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Live tracked processes, in tracking order
    pub fn running(&self) -> Vec<RunningProcess> {
        self.lock()
            .iter_mut()
            .filter_map(|(path, tracked)| {
                poll_running(tracked).then(|| RunningProcess {
                    path: path.clone(),
                    name: tracked.name.clone(),
                    pid: tracked.handle.id(),
                })
            })
            .collect()
    }

    /// Untrack every process that has exited. Returns `(path, exit code)` pairs.
    pub fn reap_exited(&self) -> Vec<(PathBuf, Option<i32>)> {
        let exited: Vec<(PathBuf, String, Option<i32>)> = self
            .lock()
            .iter_mut()
            .filter_map(|(path, tracked)| match tracked.handle.poll() {
                Ok(ProcessState::Running) => None,
                Ok(ProcessState::Exited(code)) => Some((path.clone(), tracked.name.clone(), code)),
                Err(e) => {
                    log::warn!("[{}] Error checking process status: {}", tracked.name, e);
                    Some((path.clone(), tracked.name.clone(), None))
                }
            })
            .collect();

        exited
            .into_iter()
            .map(|(path, name, code)| {
                log::info!("[{}] Process exited with code: {:?}", name, code);
                self.untrack(&path);
                (path, code)
            })
            .collect()
    }

    /// Poll tracked processes for exit in the background.
    ///
    /// The monitor stops when the returned handle is dropped.
    pub fn monitor(&self) -> MonitorHandle {
        let registry = self.clone();
        let period = self.config.monitor_interval;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                registry.reap_exited();
            }
        });
        MonitorHandle { task }
    }

    /// Stop one tracked process, escalating from terminate to kill
    pub async fn close(&self, path: &Path) -> CloseOutcome {
        let Some(name) = self.live_name(path) else {
            return CloseOutcome::NotRunning;
        };

        let outcome = self.escalate(path, &name).await;
        match outcome {
            CloseOutcome::Closed => {
                self.events
                    .status(format!("Closed {}", name), Severity::Warning, STATUS_DURATION_MS)
            }
            CloseOutcome::Failed => self.events.status(
                format!("Error closing {}: process is still running", name),
                Severity::Error,
                STATUS_DURATION_MS,
            ),
            CloseOutcome::NotRunning => {}
        }
        outcome
    }

    /// Stop every tracked process.
    ///
    /// Works on a snapshot of the tracked paths, so concurrent untracking
    /// does not disturb the iteration. Failures are collected, never fatal.
    pub async fn close_all(&self) -> CloseSummary {
        let paths: Vec<PathBuf> = self.lock().keys().cloned().collect();

        if paths.is_empty() {
            self.events.status(
                "No running programs to close",
                Severity::Warning,
                STATUS_DURATION_MS,
            );
            return CloseSummary::default();
        }

        log::info!("Attempting to close {} processes", paths.len());

        let mut summary = CloseSummary::default();
        for path in paths {
            let Some(name) = self.live_name(&path) else {
                continue;
            };

            match self.escalate(&path, &name).await {
                CloseOutcome::Closed => summary.closed_count += 1,
                CloseOutcome::Failed => summary.failed.push(name),
                CloseOutcome::NotRunning => {}
            }

            tokio::task::yield_now().await;
        }

        if summary.failed.is_empty() {
            self.events.status(
                format!("Closed {} programs successfully.", summary.closed_count),
                Severity::Success,
                STATUS_DURATION_MS,
            );
        } else {
            self.events.status(
                format!(
                    "Closed {} programs. Failed to close: {}",
                    summary.closed_count,
                    summary.failed.join(", ")
                ),
                Severity::Warning,
                STATUS_DURATION_MS,
            );
        }

        summary
    }

    /// Name of the process tracked under `path`, if it is still live
    fn live_name(&self, path: &Path) -> Option<String> {
        let mut processes = self.lock();
        let tracked = processes.get_mut(path)?;
        poll_running(tracked).then(|| tracked.name.clone())
    }

    /// Run `f` against the handle tracked under `path` without holding the
    /// lock past the call. None when nothing is tracked there anymore.
    fn with_handle<T>(
        &self,
        path: &Path,
        f: impl FnOnce(&mut dyn ProcessHandle) -> T,
    ) -> Option<T> {
        let mut processes = self.lock();
        processes.get_mut(path).map(|t| f(t.handle.as_mut()))
    }

    async fn escalate(&self, path: &Path, name: &str) -> CloseOutcome {
        let pid = self.with_handle(path, |h| h.id()).flatten();
        log::info!("[{}] Closing (PID: {:?})...", name, pid);

        match self.with_handle(path, |h| h.terminate()) {
            None => return CloseOutcome::NotRunning,
            Some(Err(e)) => log::warn!("[{}] Terminate failed: {}", name, e),
            Some(Ok(())) => {}
        }

        if self.wait_for_exit(path, name, self.config.grace_period).await {
            self.untrack(path);
            return CloseOutcome::Closed;
        }

        log::warn!("[{}] Process did not exit gracefully, forcing kill", name);
        if let Some(Err(e)) = self.with_handle(path, |h| h.kill()) {
            log::warn!("[{}] Kill failed: {}", name, e);
        }

        if self.wait_for_exit(path, name, self.config.kill_timeout).await {
            self.untrack(path);
            CloseOutcome::Closed
        } else {
            log::error!("[{}] Process still running after termination attempts", name);
            CloseOutcome::Failed
        }
    }

    /// Poll until the process under `path` exits or `timeout` passes
    async fn wait_for_exit(&self, path: &Path, name: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            // An absent entry was reaped by the monitor: it exited
            let running = self
                .with_handle(path, |h| match h.poll() {
                    Ok(state) => state.is_running(),
                    Err(e) => {
                        log::warn!(
                            "[{}] Exit could not be confirmed, treating as exited: {}",
                            name,
                            e
                        );
                        false
                    }
                })
                .unwrap_or(false);
            if !running {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(self.config.poll_step.min(deadline - now)).await;
        }
    }
}

fn poll_running(tracked: &mut TrackedProcess) -> bool {
    match tracked.handle.poll() {
        Ok(state) => state.is_running(),
        Err(e) => {
            log::debug!("[{}] Error checking process status: {}", tracked.name, e);
            false
        }
    }
}

/// Background exit monitor; aborted on drop
pub struct MonitorHandle {
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
