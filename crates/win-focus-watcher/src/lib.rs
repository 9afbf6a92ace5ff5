//! win-focus-watcher: report foreground-window changes on Windows.
//!
//! [`FocusHook::install`] registers an out-of-context
//! `EVENT_SYSTEM_FOREGROUND` hook on the calling thread and
//! [`FocusHook::run`] pumps that thread's messages until a [`QuitHandle`]
//! posts a quit. Each accepted event is resolved to a process id and passed to
//! a caller-supplied handler.
//!
//! This crate knows nothing about audio. Whatever the handler does runs inside
//! the message loop, so it should record the switch and return.

mod error;
pub mod filter;
#[cfg(windows)]
mod hook;

pub use error::{Error, Result};
pub use filter::HookOptions;
#[cfg(windows)]
pub use hook::{FocusHook, QuitHandle, quit_on_console_ctrl};
