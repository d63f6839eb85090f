//! Profile store schema and file loading

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::migrate::migrate;
use crate::runtime::{Entry, Profile};

/// Current store format version
pub const STORE_VERSION: u32 = 1;

/// Name of the profile that always exists
pub const DEFAULT_PROFILE: &str = "Default";

pub(crate) const DEFAULT_LAUNCH_DELAY: u64 = 5;

/// Minimum number of program slots per profile
pub(crate) const MIN_PROGRAM_SLOTS: usize = 2;

/// Root of the saved profile store.
///
/// Loaded only through `migrate`, so it is never deserialized directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileStore {
    pub version: u32,

    /// Profile selected when the store was saved
    pub current_profile: String,

    /// Name the `Default` profile is shown under
    pub default_profile_display_name: String,

    /// Profiles in their saved order
    pub profiles: IndexMap<String, ProfileConfig>,
}

/// One named profile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileConfig {
    /// Default delay in seconds after each program
    pub launch_delay: u64,
    pub programs: Vec<ProgramConfig>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            launch_delay: DEFAULT_LAUNCH_DELAY,
            programs: vec![ProgramConfig::default(); MIN_PROGRAM_SLOTS],
        }
    }
}

/// One program slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramConfig {
    #[serde(default)]
    pub name: String,

    /// Executable path; empty for a blank slot
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub use_custom_delay: bool,

    #[serde(default)]
    pub custom_delay_value: u64,
}

impl ProgramConfig {
    pub fn to_entry(&self) -> Entry {
        let mut entry = Entry::new(self.name.clone(), PathBuf::from(&self.path));
        entry.use_custom_delay = self.use_custom_delay;
        entry.custom_delay_secs = self.custom_delay_value;
        entry
    }
}

impl Default for ProfileStore {
    fn default() -> Self {
        let mut profiles = IndexMap::new();
        profiles.insert(DEFAULT_PROFILE.to_string(), ProfileConfig::default());
        Self {
            version: STORE_VERSION,
            current_profile: DEFAULT_PROFILE.to_string(),
            default_profile_display_name: DEFAULT_PROFILE.to_string(),
            profiles,
        }
    }
}

/// On-disk format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreFormat {
    Json,
    Yaml,
}

impl StoreFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                StoreFormat::Yaml
            }
            _ => StoreFormat::Json,
        }
    }
}

impl ProfileStore {
    /// Platform default store location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("launchpad").join("profiles.json"))
    }

    /// Load and migrate a store from a JSON or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        match StoreFormat::for_path(path) {
            StoreFormat::Json => Self::from_json(&content),
            StoreFormat::Yaml => Self::from_yaml(&content),
        }
    }

    /// Load the store at `path`, or a fresh store if the file does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No profile store at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        migrate(value)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_yaml::from_str(content)?;
        migrate(value)
    }

    /// Write the store back, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |e: std::io::Error| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = match StoreFormat::for_path(path) {
            StoreFormat::Json => serde_json::to_string_pretty(self)?,
            StoreFormat::Yaml => serde_yaml::to_string(self)?,
        };
        std::fs::write(path, content).map_err(io_err)?;
        log::debug!("Saved profile store to {}", path.display());
        Ok(())
    }

    /// Profile names as shown to the user, in saved order
    pub fn display_names(&self) -> Vec<String> {
        self.profiles
            .keys()
            .map(|name| self.display_name_of(name))
            .collect()
    }

    fn display_name_of(&self, name: &str) -> String {
        if name == DEFAULT_PROFILE {
            self.default_profile_display_name.clone()
        } else {
            name.to_string()
        }
    }

    /// Resolve a stored or display name to the stored key
    fn resolve(&self, name: &str) -> Option<&str> {
        self.profiles
            .get_key_value(name)
            .map(|(key, _)| key.as_str())
            .or_else(|| (name == self.default_profile_display_name).then_some(DEFAULT_PROFILE))
    }

    /// Build the runtime profile for `name` (stored or display name)
    pub fn profile(&self, name: &str) -> Result<Profile, ConfigError> {
        let key = self
            .resolve(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;
        let config = self
            .profiles
            .get(key)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;

        let mut profile = Profile::new(self.display_name_of(key), config.launch_delay);
        profile.entries = config.programs.iter().map(ProgramConfig::to_entry).collect();
        Ok(profile)
    }

    /// The profile selected when the store was saved
    pub fn current(&self) -> Result<Profile, ConfigError> {
        self.profile(&self.current_profile)
    }
}

/// Errors that can occur when loading or saving the profile store
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access profile store '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse profile store: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse profile store: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported profile store version {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u64, supported: u32 },

    #[error("Invalid profile store: {0}")]
    Invalid(String),

    #[error("Unknown profile '{0}'")]
    UnknownProfile(String),
}
