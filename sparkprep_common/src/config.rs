//! Runtime configuration.

use std::{env, path::PathBuf};

/// The directory under which we lay out per-application files, unless
/// overridden.
pub const DEFAULT_MOUNT_ROOT: &str = "/mnt/";

/// Environment variable which, when set to exactly `"true"`, keeps
/// application directories around after teardown.
pub const DEBUG_MODE_ENV_VAR: &str = "DEBUG_MODE";

/// Environment variable which overrides `DEFAULT_MOUNT_ROOT`.
pub const MOUNT_ROOT_ENV_VAR: &str = "SPARKPREP_MOUNT_ROOT";

/// Settings shared by everything that touches the on-disk layout.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Root of the per-application directory tree.
    pub mount_root: PathBuf,
    /// Keep application directories instead of deleting them on teardown.
    pub debug_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mount_root: PathBuf::from(DEFAULT_MOUNT_ROOT),
            debug_mode: false,
        }
    }
}

impl Config {
    /// Read our configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read our configuration using `lookup` to fetch variables. Missing
    /// variables fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        if let Some(root) = lookup(MOUNT_ROOT_ENV_VAR).filter(|root| !root.is_empty()) {
            config.mount_root = PathBuf::from(root);
        }
        // Case-sensitive on purpose: "TRUE" and "1" do not count.
        config.debug_mode = lookup(DEBUG_MODE_ENV_VAR).as_deref() == Some("true");
        config
    }
}

#[cfg(test)]
fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars = vars
        .iter()
        .map(|&(k, v)| (k.to_owned(), v.to_owned()))
        .collect::<std::collections::HashMap<_, _>>();
    move |name| vars.get(name).cloned()
}

#[test]
fn defaults_when_nothing_is_set() {
    assert_eq!(Config::from_lookup(lookup_in(&[])), Config::default());
    assert_eq!(Config::default().mount_root, PathBuf::from("/mnt/"));
}

#[test]
fn debug_mode_requires_exact_true() {
    for &(value, expected) in &[("true", true), ("TRUE", false), ("1", false), ("", false)] {
        let config = Config::from_lookup(lookup_in(&[(DEBUG_MODE_ENV_VAR, value)]));
        assert_eq!(config.debug_mode, expected, "DEBUG_MODE={:?}", value);
    }
}

#[test]
fn mount_root_can_be_overridden() {
    let config = Config::from_lookup(lookup_in(&[(MOUNT_ROOT_ENV_VAR, "/scratch")]));
    assert_eq!(config.mount_root, PathBuf::from("/scratch"));

    let config = Config::from_lookup(lookup_in(&[(MOUNT_ROOT_ENV_VAR, "")]));
    assert_eq!(config.mount_root, PathBuf::from(DEFAULT_MOUNT_ROOT));
}
