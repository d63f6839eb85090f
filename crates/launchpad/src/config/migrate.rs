//! Upgrades raw profile store documents to the current schema

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::config::profile_store::{
    ConfigError, ProfileConfig, ProfileStore, ProgramConfig, DEFAULT_LAUNCH_DELAY,
    DEFAULT_PROFILE, MIN_PROGRAM_SLOTS, STORE_VERSION,
};

/// Convert a parsed store document of any known version into a `ProfileStore`.
///
/// Documents without a `version` key are treated as version 0, where a
/// profile may be a bare list of programs. The result always has a `Default`
/// profile, at least two program slots per profile and a `current_profile`
/// that names an existing profile.
pub fn migrate(value: Value) -> Result<ProfileStore, ConfigError> {
    let Value::Object(mut root) = value else {
        return Err(ConfigError::Invalid("expected a mapping at the top level".into()));
    };

    let version = match root.get("version") {
        None => 0,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| ConfigError::Invalid(format!("bad version: {}", v)))?,
    };
    if version > u64::from(STORE_VERSION) {
        return Err(ConfigError::UnsupportedVersion {
            found: version,
            supported: STORE_VERSION,
        });
    }
    if version < u64::from(STORE_VERSION) {
        log::info!("Migrating profile store from version {}", version);
    }

    let mut profiles = match root.remove("profiles") {
        None | Some(Value::Null) => IndexMap::new(),
        Some(Value::Object(map)) => migrate_profiles(map)?,
        Some(other) => {
            return Err(ConfigError::Invalid(format!(
                "expected 'profiles' to be a mapping, found {}",
                other
            )))
        }
    };

    if !profiles.contains_key(DEFAULT_PROFILE) {
        let mut with_default = IndexMap::with_capacity(profiles.len() + 1);
        with_default.insert(DEFAULT_PROFILE.to_string(), ProfileConfig::default());
        with_default.extend(profiles);
        profiles = with_default;
    }

    let mut current_profile = string_field(&root, "current_profile");
    if !profiles.contains_key(&current_profile) {
        if !current_profile.is_empty() {
            log::warn!(
                "Profile '{}' not found, falling back to {}",
                current_profile,
                DEFAULT_PROFILE
            );
        }
        current_profile = DEFAULT_PROFILE.to_string();
    }

    let mut default_profile_display_name = string_field(&root, "default_profile_display_name");
    if default_profile_display_name.trim().is_empty() {
        default_profile_display_name = DEFAULT_PROFILE.to_string();
    }

    Ok(ProfileStore {
        version: STORE_VERSION,
        current_profile,
        default_profile_display_name,
        profiles,
    })
}

fn string_field(root: &Map<String, Value>, key: &str) -> String {
    root.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn migrate_profiles(
    raw: Map<String, Value>,
) -> Result<IndexMap<String, ProfileConfig>, ConfigError> {
    let mut profiles = IndexMap::with_capacity(raw.len());
    for (name, value) in raw {
        let (launch_delay, programs) = match value {
            // Version 0: the profile is its program list
            Value::Array(programs) => (DEFAULT_LAUNCH_DELAY, programs),
            Value::Object(mut map) => {
                let delay = map
                    .get("launch_delay")
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_LAUNCH_DELAY);
                let programs = match map.remove("programs") {
                    Some(Value::Array(programs)) => programs,
                    _ => Vec::new(),
                };
                (delay, programs)
            }
            other => {
                log::warn!("Ignoring malformed profile '{}': {}", name, other);
                continue;
            }
        };

        let mut programs = programs
            .into_iter()
            .filter(Value::is_object)
            .map(serde_json::from_value::<ProgramConfig>)
            .collect::<Result<Vec<_>, _>>()?;
        if programs.len() < MIN_PROGRAM_SLOTS {
            programs.resize(MIN_PROGRAM_SLOTS, ProgramConfig::default());
        }

        profiles.insert(
            name,
            ProfileConfig {
                launch_delay,
                programs,
            },
        );
    }
    Ok(profiles)
}
