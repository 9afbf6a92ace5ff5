//! Failures that end the process, and the exit code each one maps to.

use thiserror::Error;

/// Exit code for a clean shutdown.
pub const EXIT_OK: i32 = 0;
/// Exit code when the host platform has no implementation.
pub const EXIT_UNSUPPORTED: i32 = 11;

/// Anything that stops `focusmute` early.
#[derive(Debug, Error)]
pub enum Failure {
    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] config::Error),

    /// Worker startup, runtime, or shutdown failed.
    #[error(transparent)]
    Core(#[from] focusmute_core::Error),

    /// The foreground hook or its message loop failed.
    #[error(transparent)]
    Focus(#[from] win_focus_watcher::Error),

    /// Not built for a platform with audio sessions.
    #[error("focusmute only runs on Windows")]
    Unsupported,
}

impl Failure {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::Core(e) => e.exit_code(),
            Self::Focus(e) => e.exit_code(),
            Self::Unsupported => EXIT_UNSUPPORTED,
        }
    }

    /// Message for stderr. Configuration errors include their excerpt.
    pub fn report(&self) -> String {
        match self {
            Self::Config(e) => e.pretty(),
            other => other.to_string(),
        }
    }
}
