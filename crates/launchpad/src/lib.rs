//! Launchpad: ordered program launcher
//!
//! Launches the programs of a profile one after another with a delay between
//! them, keeps track of the processes it started and closes them again on
//! request (graceful terminate first, forced kill as a fallback).
//!
//! # Overview
//!
//! - [`LaunchSequence`] drives a launch queue on tokio timers and reports
//!   progress on an [`EventBus`].
//! - [`ProcessRegistry`] owns the spawned process handles, detects exits and
//!   implements `close`/`close_all`.
//! - [`ProfileStore`] loads saved profiles (JSON or YAML) and migrates older
//!   store versions.
//!
//! # Example Profile Store
//!
//! ```json
//! {
//!   "version": 1,
//!   "current_profile": "Streaming",
//!   "default_profile_display_name": "Default",
//!   "profiles": {
//!     "Streaming": {
//!       "launch_delay": 5,
//!       "programs": [
//!         {"name": "OBS", "path": "/usr/bin/obs", "use_custom_delay": false, "custom_delay_value": 0},
//!         {"name": "Chat", "path": "/usr/bin/chat", "use_custom_delay": true, "custom_delay_value": 2}
//!       ]
//!     }
//!   }
//! }
//! ```
//!
//! Each program waits for the delay of the program launched *before* it; the
//! first program starts immediately.

pub mod cli;
pub mod config;
pub mod runtime;

pub use cli::LaunchArgs;
pub use config::{migrate, ConfigError, ProfileConfig, ProfileStore, ProgramConfig};
pub use runtime::{
    launch_entry, CloseOutcome, CloseSummary, Entry, EntryStatus, EventBus, LaunchEvent,
    LaunchPlan, LaunchPlanStep, LaunchQueue, LaunchSequence, MonitorHandle, OsSpawner,
    ProcessError, ProcessHandle, ProcessRegistry, ProcessState, Profile, RegistryConfig,
    RunningProcess, SequenceConfig, SequenceError, SequenceState, SequenceStateChange,
    SequenceSummary, Severity, Spawner, StatusMessage,
};
