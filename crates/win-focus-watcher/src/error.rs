//! Error types and result alias for the win-focus-watcher crate.
use std::result::Result as StdResult;

use thiserror::Error;

/// Convenient result type used throughout this crate.
pub type Result<T> = StdResult<T, Error>;

/// Error variants produced by this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `SetWinEventHook` returned a null hook.
    #[error("Failed to install foreground hook: {message} ({code:#010x})")]
    HookInstall {
        /// Last OS error.
        code: i32,
        /// System message for `code`.
        message: String,
    },
    /// A hook is already installed on this thread.
    #[error("A foreground hook is already installed on this thread")]
    AlreadyInstalled,
    /// `GetMessageW` failed.
    #[error("Message loop failed: {message} ({code:#010x})")]
    MessageLoop {
        /// Last OS error.
        code: i32,
        /// System message for `code`.
        message: String,
    },
    /// A quit message could not be posted to the hook thread.
    #[error("Failed to post quit to thread {thread_id}: {message}")]
    PostQuit {
        /// Target thread.
        thread_id: u32,
        /// System message.
        message: String,
    },
    /// The console control handler could not be registered.
    #[error("Failed to register console control handler: {0}")]
    ConsoleHandler(String),
}

impl Error {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::HookInstall { .. } | Self::AlreadyInstalled | Self::ConsoleHandler(_) => 8,
            Self::MessageLoop { .. } | Self::PostQuit { .. } => 10,
        }
    }
}
