//! Launch queue construction and delay chain computation

use std::path::PathBuf;
use std::time::Duration;

use crate::runtime::entry::{Entry, Profile};

/// Order-preserving snapshot of the entries that will be launched.
///
/// Built once at sequence start from the entries whose executable exists;
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct LaunchQueue {
    entries: Vec<Entry>,
    default_delay_secs: u64,
}

impl LaunchQueue {
    /// Snapshot `entries`, dropping those whose path does not exist
    pub fn build(entries: &[Entry], default_delay_secs: u64) -> Self {
        let entries = entries
            .iter()
            .filter(|e| {
                let exists = e.path_exists();
                if !exists {
                    log::debug!(
                        "[{}] Skipping, path does not exist: {}",
                        e.display_name(),
                        e.path.display()
                    );
                }
                exists
            })
            .cloned()
            .collect();

        Self {
            entries,
            default_delay_secs,
        }
    }

    pub fn from_profile(profile: &Profile) -> Self {
        Self::build(&profile.entries, profile.default_delay_secs)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn default_delay_secs(&self) -> u64 {
        self.default_delay_secs
    }

    /// Wait applied before launching the entry at `index`.
    ///
    /// The first entry is never delayed. Every later entry waits for the
    /// effective delay of the entry queued *before* it, not its own.
    pub fn delay_before(&self, index: usize) -> Duration {
        if index == 0 {
            return Duration::ZERO;
        }
        self.entries
            .get(index - 1)
            .map(|prev| prev.effective_delay(self.default_delay_secs))
            .unwrap_or(Duration::ZERO)
    }
}

/// Launch plan for dry-run mode
#[derive(Debug)]
pub struct LaunchPlan {
    pub profile: String,
    pub default_delay_secs: u64,
    /// Entries in launch order
    pub steps: Vec<LaunchPlanStep>,
    /// Entries left out because their executable is missing
    pub skipped: Vec<(String, PathBuf)>,
}

/// One launch in the plan
#[derive(Debug)]
pub struct LaunchPlanStep {
    pub name: String,
    pub path: PathBuf,
    /// Wait before this launch
    pub wait: Duration,
    /// Offset from sequence start, ignoring spawn time
    pub at: Duration,
}

impl LaunchPlan {
    pub fn from_profile(profile: &Profile) -> Self {
        let queue = LaunchQueue::from_profile(profile);

        let mut at = Duration::ZERO;
        let steps = queue
            .entries()
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let wait = queue.delay_before(i);
                at = at.saturating_add(wait);
                LaunchPlanStep {
                    name: entry.display_name(),
                    path: entry.path.clone(),
                    wait,
                    at,
                }
            })
            .collect();

        let skipped = profile
            .entries
            .iter()
            .filter(|e| !e.path_exists())
            .map(|e| (e.display_name(), e.path.clone()))
            .collect();

        Self {
            profile: profile.name.clone(),
            default_delay_secs: profile.default_delay_secs,
            steps,
            skipped,
        }
    }
}

/// Display the launch plan in a human-readable format
impl std::fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Launch Plan: {}", self.profile)?;
        writeln!(f, "===========")?;
        writeln!(f)?;
        writeln!(f, "Default delay: {}s", self.default_delay_secs)?;
        writeln!(f)?;

        writeln!(f, "Programs (in launch order):")?;
        if self.steps.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "  {}. {}", i + 1, step.name)?;
            writeln!(f, "     Path: {}", step.path.display())?;
            if !step.wait.is_zero() {
                writeln!(f, "     Wait: {}s (set by previous program)", step.wait.as_secs())?;
            }
            writeln!(f, "     Starts at: t+{}s", step.at.as_secs())?;
        }

        if !self.skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "Skipped (path not found):")?;
            for (name, path) in &self.skipped {
                if name.is_empty() {
                    writeln!(f, "  - (blank slot)")?;
                } else {
                    writeln!(f, "  - {} ({})", name, path.display())?;
                }
            }
        }

        Ok(())
    }
}
