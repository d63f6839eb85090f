//! Command-line interface for launchpad

use argh::FromArgs;
use std::path::PathBuf;

use crate::config::ProfileStore;

/// Launch a profile's programs in order, with delays between them
#[derive(FromArgs, Debug)]
pub struct LaunchArgs {
    /// path to the profile store (default: <config dir>/launchpad/profiles.json)
    #[argh(positional)]
    pub store: Option<PathBuf>,

    /// profile to launch (default: the store's current profile)
    #[argh(option, short = 'p')]
    pub profile: Option<String>,

    /// show launch plan without executing
    #[argh(switch)]
    pub dry_run: bool,

    /// validate the profile store and exit
    #[argh(switch)]
    pub validate: bool,

    /// list profile names and exit
    #[argh(switch)]
    pub list: bool,

    /// leave launched programs running on exit
    #[argh(switch)]
    pub detach: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")", from_str_fn(parse_log_level))]
    pub log_level: String,
}

/// Accept a known log level, case-insensitively
fn parse_log_level(s: &str) -> Result<String, String> {
    let level = s.to_lowercase();
    match level.as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => Ok(level),
        _ => Err(format!(
            "Invalid log level '{}'. Expected error, warn, info, debug or trace",
            s
        )),
    }
}

impl LaunchArgs {
    /// Store path from the command line, falling back to the platform default
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store.clone().or_else(ProfileStore::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<LaunchArgs, argh::EarlyExit> {
        LaunchArgs::from_args(&["launchpad"], args)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]).unwrap();
        assert!(args.store.is_none());
        assert!(args.profile.is_none());
        assert!(!args.dry_run);
        assert!(!args.detach);
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_full_command_line() {
        let args = parse(&[
            "profiles.yaml",
            "-p",
            "Streaming",
            "--dry-run",
            "--detach",
            "-l",
            "DEBUG",
        ])
        .unwrap();
        assert_eq!(args.store_path(), Some(PathBuf::from("profiles.yaml")));
        assert_eq!(args.profile.as_deref(), Some("Streaming"));
        assert!(args.dry_run);
        assert!(args.detach);
        assert_eq!(args.log_level, "debug");
    }

    #[test]
    fn test_parse_log_level_invalid() {
        assert!(parse_log_level("loud").is_err());
        assert!(parse(&["-l", "loud"]).is_err());
    }
}
