//! Merge command-line overrides into the loaded configuration.

use config::Config;
use focusmute_core::LifecycleSettings;

/// Settings given on the command line. Each one beats the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Replaces `ready_timeout_ms`.
    pub ready_timeout_ms: Option<u64>,
    /// Replaces `join_timeout_ms`.
    pub join_timeout_ms: Option<u64>,
    /// Forces `restore_on_exit` off.
    pub no_restore: bool,
}

impl Overrides {
    /// Apply to `cfg` and validate the result.
    pub fn apply(self, mut cfg: Config) -> Result<Config, config::Error> {
        if let Some(ms) = self.ready_timeout_ms {
            cfg.ready_timeout_ms = ms;
        }
        if let Some(ms) = self.join_timeout_ms {
            cfg.join_timeout_ms = Some(ms);
        }
        if self.no_restore {
            cfg.restore_on_exit = false;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Worker settings for `cfg`.
pub fn lifecycle_settings(cfg: &Config) -> LifecycleSettings {
    LifecycleSettings {
        ready_timeout: cfg.ready_timeout(),
        join_timeout: cfg.join_timeout(),
        restore_on_exit: cfg.restore_on_exit,
    }
}
