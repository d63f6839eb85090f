//! Launch sequencer: launches a queue of entries in order, waiting between them
//!
//! The sequencer is a small state machine:
//!
//! ```text
//! Idle --start--> Launching <--> Delaying
//!                     |
//!                     +--> Complete --start--> Launching
//! ```
//!
//! `start` performs the first launch synchronously and hands the rest of the
//! queue to a tokio task. That task alternates between waiting (a scheduled
//! timer, never a blocking sleep) and launching, yielding to the runtime
//! between steps so long queues never grow the stack.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::runtime::entry::{Entry, EntryStatus, Profile};
use crate::runtime::events::{
    EventBus, LaunchEvent, SequenceStateChange, Severity, STATUS_DURATION_MS,
};
use crate::runtime::process::{ProcessError, Spawner};
use crate::runtime::queue::LaunchQueue;
use crate::runtime::registry::ProcessRegistry;

const COUNTDOWN_DISPLAY_MS: u64 = 200;
const LAUNCHING_DISPLAY_MS: u64 = 3000;

/// Stand-in deadline for delays too large to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Sequencer configuration
#[derive(Debug, Clone)]
pub struct SequenceConfig {
    /// Countdown status refresh period while delaying
    pub countdown_tick: Duration,
    /// Warn about effective delays shorter than this many seconds (None = never)
    pub low_delay_warning_secs: Option<u64>,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            countdown_tick: Duration::from_millis(100),
            low_delay_warning_secs: Some(5),
        }
    }
}

/// Sequencer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    Idle,
    Launching,
    Delaying,
    Complete,
}

impl SequenceState {
    /// Whether a sequence is in flight
    pub fn is_active(&self) -> bool {
        matches!(self, SequenceState::Launching | SequenceState::Delaying)
    }
}

/// Outcome of a finished sequence
#[derive(Debug, Clone)]
pub struct SequenceSummary {
    /// Entries still running when the sequence finished
    pub launched_count: usize,
    pub total_count: usize,
    /// Queue entries with their final status
    pub entries: Vec<Entry>,
}

/// Errors returned by `LaunchSequence::start`
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("A launch sequence is already running")]
    Busy,

    #[error("No programs configured with valid paths to launch")]
    NothingToLaunch,
}

struct SequenceInner {
    state: SequenceState,
    queue: LaunchQueue,
    index: usize,
    /// Entries already processed, with their launch outcome
    launched: Vec<Entry>,
}

/// What the sequencer does next
enum Step {
    Launch,
    Wait { delay: Duration, name: String },
    Finish,
}

/// Timer-driven launcher for one queue at a time
#[derive(Clone)]
pub struct LaunchSequence {
    inner: Arc<Mutex<SequenceInner>>,
    registry: ProcessRegistry,
    spawner: Arc<dyn Spawner>,
    events: EventBus,
    config: SequenceConfig,
}

impl LaunchSequence {
    /// Create a sequencer publishing on the registry's event bus
    pub fn new(registry: ProcessRegistry, spawner: Arc<dyn Spawner>) -> Self {
        let events = registry.events().clone();
        Self {
            inner: Arc::new(Mutex::new(SequenceInner {
                state: SequenceState::Idle,
                queue: LaunchQueue::build(&[], 0),
                index: 0,
                launched: Vec::new(),
            })),
            registry,
            spawner,
            events,
            config: SequenceConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SequenceConfig) -> Self {
        self.config = config;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SequenceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SequenceState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_active()
    }

    pub fn start_profile(
        &self,
        profile: &Profile,
    ) -> Result<JoinHandle<SequenceSummary>, SequenceError> {
        self.start(&profile.entries, profile.default_delay_secs)
    }

    /// Start launching `entries` in order.
    ///
    /// Entries whose executable does not exist are left out. The first entry
    /// is launched before this returns; the returned task drives the rest and
    /// resolves to the summary. Must be called from within a tokio runtime.
    pub fn start(
        &self,
        entries: &[Entry],
        default_delay_secs: u64,
    ) -> Result<JoinHandle<SequenceSummary>, SequenceError> {
        {
            let mut inner = self.lock();
            if inner.state.is_active() {
                drop(inner);
                log::warn!("Launch sequence already running");
                self.events.status(
                    SequenceError::Busy.to_string(),
                    Severity::Warning,
                    STATUS_DURATION_MS,
                );
                return Err(SequenceError::Busy);
            }

            let queue = LaunchQueue::build(entries, default_delay_secs);
            if queue.is_empty() {
                inner.state = SequenceState::Idle;
                drop(inner);
                self.events.status(
                    SequenceError::NothingToLaunch.to_string(),
                    Severity::Warning,
                    STATUS_DURATION_MS,
                );
                return Err(SequenceError::NothingToLaunch);
            }

            log::info!("Starting sequence with {} programs", queue.len());
            inner.launched = Vec::with_capacity(queue.len());
            inner.queue = queue;
            inner.index = 0;
            inner.state = SequenceState::Launching;
        }

        self.events
            .publish(LaunchEvent::SequenceStateChanged(SequenceStateChange::Started));

        if let Step::Launch = self.process_next() {
            self.launch_current();
        }

        // Owned by the task future, so an abort before the first poll still resets
        let guard = InterruptGuard {
            sequence: self.clone(),
            armed: true,
        };
        Ok(tokio::spawn(self.clone().drive(guard)))
    }

    async fn drive(self, mut guard: InterruptGuard) -> SequenceSummary {
        loop {
            // Next step runs on a later scheduler tick
            tokio::task::yield_now().await;

            match self.process_next() {
                Step::Finish => {
                    guard.armed = false;
                    return self.finish();
                }
                Step::Launch => self.launch_current(),
                Step::Wait { delay, name } => {
                    self.countdown(delay, &name).await;
                    log::debug!("Delay finished");
                    self.launch_current();
                }
            }
        }
    }

    /// Decide the next step and move into the matching state
    fn process_next(&self) -> Step {
        let mut inner = self.lock();
        let index = inner.index;

        if index >= inner.queue.len() {
            inner.state = SequenceState::Complete;
            return Step::Finish;
        }
        let name = inner
            .queue
            .get(index)
            .map(Entry::display_name)
            .unwrap_or_default();

        // Entry i waits for the delay configured on entry i-1
        let delay = inner.queue.delay_before(index);
        if delay.is_zero() {
            inner.state = SequenceState::Launching;
            return Step::Launch;
        }

        inner.state = SequenceState::Delaying;
        drop(inner);

        log::info!("Delaying {}s before launching '{}'", delay.as_secs(), name);
        if let Some(threshold) = self.config.low_delay_warning_secs {
            if delay.as_secs() < threshold {
                self.events.status(
                    format!(
                        "Short launch delay ({}s) before {}; some programs may not finish starting",
                        delay.as_secs(),
                        name
                    ),
                    Severity::Warning,
                    STATUS_DURATION_MS,
                );
            }
        }

        Step::Wait { delay, name }
    }

    /// Wait out `delay`, publishing the remaining time on every tick
    async fn countdown(&self, delay: Duration, name: &str) {
        let now = Instant::now();
        let deadline = now.checked_add(delay).unwrap_or(now + FAR_FUTURE);
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);
        let mut tick = tokio::time::interval(self.config.countdown_tick);

        loop {
            tokio::select! {
                biased;
                _ = &mut sleep => break,
                _ = tick.tick() => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if !remaining.is_zero() {
                        let secs = remaining.as_millis().div_ceil(1000);
                        self.events.status(
                            format!("Launching {} in {}s...", name, secs),
                            Severity::Warning,
                            COUNTDOWN_DISPLAY_MS,
                        );
                    }
                }
            }
        }
    }

    /// Launch the entry at the current index and advance.
    ///
    /// A spawn failure marks the entry as errored; the sequence continues.
    fn launch_current(&self) {
        let mut entry = {
            let mut inner = self.lock();
            inner.state = SequenceState::Launching;
            let index = inner.index;
            let current = inner.queue.get(index).cloned();
            match current {
                Some(entry) => entry,
                None => return,
            }
        };

        log::info!("[{}] Launching", entry.display_name());
        self.events.status(
            format!("Launching {}...", entry.display_name()),
            Severity::Launching,
            LAUNCHING_DISPLAY_MS,
        );

        // Failure is already recorded on the entry and published
        let _ = spawn_and_track(&mut entry, &self.registry, self.spawner.as_ref());

        let mut inner = self.lock();
        inner.launched.push(entry);
        inner.index += 1;
    }

    /// Summarize, publish and reset
    fn finish(&self) -> SequenceSummary {
        log::info!("Sequence finished");
        let (entries, total_count) = self.reset(SequenceState::Complete);
        let launched_count = self.live_count(&entries);

        if launched_count > 0 {
            let mut text = format!(
                "Successfully launched {}/{} programs",
                launched_count, total_count
            );
            let mut severity = Severity::Success;
            if launched_count < total_count {
                text.push_str(" (some may have failed)");
                severity = Severity::Warning;
            }
            self.events.status(text, severity, STATUS_DURATION_MS);
        } else {
            self.events.status(
                "No programs were launched (check paths/errors)",
                Severity::Warning,
                STATUS_DURATION_MS,
            );
        }

        self.events
            .publish(LaunchEvent::SequenceStateChanged(SequenceStateChange::Finished {
                launched_count,
                total_count,
            }));

        SequenceSummary {
            launched_count,
            total_count,
            entries,
        }
    }

    /// Wind down a sequence whose driver stopped before finishing
    fn interrupt(&self) {
        let (entries, total_count) = self.reset(SequenceState::Idle);
        let launched_count = self.live_count(&entries);
        log::warn!(
            "Launch sequence stopped after {} of {} programs",
            entries.len(),
            total_count
        );

        self.events
            .publish(LaunchEvent::SequenceStateChanged(SequenceStateChange::Finished {
                launched_count,
                total_count,
            }));
    }

    /// Move to `state` and hand back the processed entries and queue length
    fn reset(&self, state: SequenceState) -> (Vec<Entry>, usize) {
        let mut inner = self.lock();
        inner.state = state;
        inner.index = 0;
        let total_count = inner.queue.len();
        inner.queue = LaunchQueue::build(&[], 0);
        (std::mem::take(&mut inner.launched), total_count)
    }

    fn live_count(&self, entries: &[Entry]) -> usize {
        entries
            .iter()
            .filter(|e| e.status == EntryStatus::Launched && self.registry.is_running(&e.path))
            .count()
    }
}

/// Resets the sequencer if its driver task is aborted or panics
struct InterruptGuard {
    sequence: LaunchSequence,
    armed: bool,
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if self.armed {
            self.sequence.interrupt();
        }
    }
}

/// Launch a single entry outside of a sequence.
///
/// Refuses while a process for the same path is still running.
pub fn launch_entry(
    entry: &mut Entry,
    registry: &ProcessRegistry,
    spawner: &dyn Spawner,
) -> Result<Option<u32>, ProcessError> {
    if !entry.path_exists() {
        registry.events().status(
            format!("Error: Program path does not exist: {}", entry.path.display()),
            Severity::Error,
            STATUS_DURATION_MS,
        );
        return Err(ProcessError::InvalidPath(entry.path.display().to_string()));
    }
    if registry.is_running(&entry.path) {
        return Err(ProcessError::AlreadyRunning(entry.display_name()));
    }
    spawn_and_track(entry, registry, spawner)
}

fn spawn_and_track(
    entry: &mut Entry,
    registry: &ProcessRegistry,
    spawner: &dyn Spawner,
) -> Result<Option<u32>, ProcessError> {
    let name = entry.display_name();
    set_status(entry, EntryStatus::Launching, registry.events());
    log::info!("[{}] Starting: {}", name, entry.path.display());

    match spawner.spawn(&entry.path, entry.working_dir()) {
        Ok(handle) => {
            let pid = handle.id();
            registry.track(entry.path.clone(), name, handle);
            entry.pid = pid;
            set_status(entry, EntryStatus::Launched, registry.events());
            Ok(pid)
        }
        Err(e) => {
            log::error!("[{}] Failed to spawn process: {}", name, e);
            entry.pid = None;
            set_status(entry, EntryStatus::Error, registry.events());
            registry.events().status(
                format!("Error launching {}: {}", name, e),
                Severity::Error,
                STATUS_DURATION_MS,
            );
            Err(ProcessError::SpawnFailed { name, source: e })
        }
    }
}

fn set_status(entry: &mut Entry, status: EntryStatus, events: &EventBus) {
    entry.status = status;
    events.publish(LaunchEvent::EntryStatusChanged {
        name: entry.display_name(),
        path: entry.path.clone(),
        status,
    });
}
