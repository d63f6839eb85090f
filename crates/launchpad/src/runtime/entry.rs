//! Launchable entries and the profiles that order them

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Launch status of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryStatus {
    /// Not launched, or launched and since exited
    #[default]
    Ready,
    /// Spawn in progress
    Launching,
    /// Spawned and handed to the registry
    Launched,
    /// Spawn failed
    Error,
}

/// One launchable program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Display name (may be blank)
    pub name: String,
    /// Executable path
    pub path: PathBuf,
    /// Whether `custom_delay_secs` replaces the profile default
    pub use_custom_delay: bool,
    pub custom_delay_secs: u64,
    pub status: EntryStatus,
    /// Process ID of the last successful launch
    pub pid: Option<u32>,
}

impl Entry {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            use_custom_delay: false,
            custom_delay_secs: 0,
            status: EntryStatus::Ready,
            pid: None,
        }
    }

    /// Override the profile default delay for this entry
    pub fn with_custom_delay(mut self, secs: u64) -> Self {
        self.use_custom_delay = true;
        self.custom_delay_secs = secs;
        self
    }

    /// Configured name, or the executable's file name when the name is blank
    pub fn display_name(&self) -> String {
        if !self.name.trim().is_empty() {
            return self.name.clone();
        }
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Delay this entry's configuration contributes, given the profile default
    pub fn effective_delay(&self, default_delay_secs: u64) -> Duration {
        if self.use_custom_delay {
            Duration::from_secs(self.custom_delay_secs)
        } else {
            Duration::from_secs(default_delay_secs)
        }
    }

    /// Whether the executable currently exists on disk
    pub fn path_exists(&self) -> bool {
        !self.path.as_os_str().is_empty() && self.path.exists()
    }

    /// Directory the program is started in: the executable's parent
    pub fn working_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }
}

/// A named, ordered set of entries with a default inter-launch delay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub default_delay_secs: u64,
    /// Launch order
    pub entries: Vec<Entry>,
}

impl Profile {
    pub fn new(name: impl Into<String>, default_delay_secs: u64) -> Self {
        Self {
            name: name.into(),
            default_delay_secs,
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_to_file_name() {
        let named = Entry::new("OBS", "/opt/obs/bin/obs");
        assert_eq!(named.display_name(), "OBS");

        let unnamed = Entry::new("  ", "/opt/obs/bin/obs");
        assert_eq!(unnamed.display_name(), "obs");

        let blank = Entry::new("", "");
        assert_eq!(blank.display_name(), "");
    }

    #[test]
    fn test_effective_delay() {
        let plain = Entry::new("a", "/bin/a");
        assert_eq!(plain.effective_delay(5), Duration::from_secs(5));

        let custom = Entry::new("b", "/bin/b").with_custom_delay(2);
        assert_eq!(custom.effective_delay(5), Duration::from_secs(2));

        let zero = Entry::new("c", "/bin/c").with_custom_delay(0);
        assert_eq!(zero.effective_delay(5), Duration::ZERO);
    }

    #[test]
    fn test_custom_value_ignored_when_disabled() {
        let mut entry = Entry::new("a", "/bin/a");
        entry.custom_delay_secs = 30;
        assert_eq!(entry.effective_delay(5), Duration::from_secs(5));
    }

    #[test]
    fn test_working_dir_is_parent() {
        let entry = Entry::new("a", "/opt/app/bin/run");
        assert_eq!(entry.working_dir(), Some(Path::new("/opt/app/bin")));
        assert_eq!(Entry::new("a", "run").working_dir(), None);
    }

    #[test]
    fn test_blank_path_does_not_exist() {
        assert!(!Entry::new("blank", "").path_exists());
    }
}
