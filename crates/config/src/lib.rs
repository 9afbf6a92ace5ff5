//! Runtime settings for focusmute.
//!
//! Settings live in a small RON file. Every field is optional; missing fields
//! take the values in [`Config::default`]. Unknown fields are rejected so a
//! typo does not silently fall back to a default.
//!
//! ```ron
//! (
//!     ready_timeout_ms: 20000,
//!     restore_on_exit: true,
//! )
//! ```

use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

mod error;
mod loader;

pub use error::{Error, excerpt_at};
pub use loader::{from_ron, load, load_from_path};

/// Default wait for the worker's readiness signal.
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 20_000;

/// Effective runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// How long startup waits for the worker to report ready.
    pub ready_timeout_ms: u64,
    /// Upper bound on the worker join at shutdown. `None` waits indefinitely.
    pub join_timeout_ms: Option<u64>,
    /// Deepest nested foreground notification tolerated before aborting.
    pub reentrancy_limit: u32,
    /// Unmute sessions this run muted before exiting.
    pub restore_on_exit: bool,
    /// Ignore foreground changes to this process's own windows.
    pub ignore_own_process: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            join_timeout_ms: None,
            reentrancy_limit: 0,
            restore_on_exit: true,
            ignore_own_process: true,
        }
    }
}

impl Config {
    /// Readiness timeout as a duration.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Join timeout as a duration, if bounded.
    pub fn join_timeout(&self) -> Option<Duration> {
        self.join_timeout_ms.map(Duration::from_millis)
    }

    /// Reject values that parse but cannot be used.
    pub fn validate(&self) -> Result<(), Error> {
        if self.ready_timeout_ms == 0 {
            return Err(Error::Validation {
                path: None,
                field: "ready_timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.join_timeout_ms == Some(0) {
            return Err(Error::Validation {
                path: None,
                field: "join_timeout_ms",
                message: "must be greater than zero when set".to_string(),
            });
        }
        Ok(())
    }
}

/// Determine the preferred user config path (`~/.focusmute/config.ron`).
pub fn default_config_path() -> PathBuf {
    let home = env::var_os("USERPROFILE")
        .or_else(|| env::var_os("HOME"))
        .unwrap_or_default();
    let mut p = PathBuf::from(home);
    p.push(".focusmute");
    p.push("config.ron");
    p
}

/// Resolve the effective config path.
///
/// Policy:
/// 1) Use `explicit` when provided, whether or not it exists.
/// 2) Else use `~/.focusmute/config.ron` when it exists.
/// 3) Else `None`, meaning built-in defaults.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let preferred = default_config_path();
    preferred.exists().then_some(preferred)
}
