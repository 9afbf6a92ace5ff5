//! Error types and result alias for the focusmute core.
use std::{fmt, io, result::Result as StdResult, time::Duration};

use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Convenient result type used throughout this crate.
pub type Result<T> = StdResult<T, Error>;

/// A non-success result reported by an external capability (an HRESULT on
/// Windows).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{op} failed with code {code:#010x}: {message}")]
pub struct CapabilityError {
    /// Capability operation that failed, e.g. `set_mute`.
    pub op: &'static str,
    /// Raw capability status code.
    pub code: i32,
    /// Human-readable detail supplied by the capability.
    pub message: String,
}

impl CapabilityError {
    /// Construct an error for `op` with a raw status `code`.
    pub fn new(op: &'static str, code: i32, message: impl Into<String>) -> Self {
        Self {
            op,
            code,
            message: message.into(),
        }
    }
}

/// Startup step of the session tracker. Each step maps to a distinct process
/// exit code so operators can tell which phase failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStep {
    /// Acquiring the audio capability on the worker (COM init, session manager).
    AcquireCapability,
    /// Registering the "session created" notification.
    RegisterSessionCreated,
    /// Enumerating the sessions that already exist.
    EnumerateSessions,
    /// Registering a per-session property notification.
    RegisterSessionEvents,
}

impl TrackerStep {
    /// Process exit code reported when this step fails.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::AcquireCapability => 2,
            Self::RegisterSessionCreated => 3,
            Self::EnumerateSessions => 4,
            Self::RegisterSessionEvents => 5,
        }
    }
}

impl fmt::Display for TrackerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AcquireCapability => "acquire_capability",
            Self::RegisterSessionCreated => "register_session_created",
            Self::EnumerateSessions => "enumerate_sessions",
            Self::RegisterSessionEvents => "register_session_events",
        };
        f.write_str(s)
    }
}

/// Error variants produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A capability call failed outside of tracker startup.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// The session tracker failed during startup and unwound.
    #[error("Session tracker failed at {step}: {source}")]
    Startup {
        /// The step that failed.
        step: TrackerStep,
        /// Underlying capability failure.
        #[source]
        source: CapabilityError,
    },

    /// The worker did not report readiness within the bounded wait.
    #[error("Worker not ready after {0:?}")]
    ReadyTimeout(Duration),

    /// The worker thread exited before it reported readiness.
    #[error("Worker exited before becoming ready")]
    WorkerExited,

    /// The worker thread panicked.
    #[error("Worker thread panicked")]
    WorkerPanicked,

    /// The worker did not finish teardown within the bounded join.
    #[error("Worker did not stop within {0:?}")]
    JoinTimeout(Duration),

    /// The worker thread could not be spawned.
    #[error("Failed to spawn worker: {0}")]
    Spawn(#[source] io::Error),

    /// The detection callback nested deeper than the configured limit.
    #[error("Detection callback re-entered {depth} time(s), limit {limit}")]
    Reentrancy {
        /// Observed nesting depth.
        depth: u32,
        /// Configured limit.
        limit: u32,
    },

    /// A lifecycle transition was requested from the wrong state.
    #[error("Invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidState {
        /// Current state.
        from: LifecycleState,
        /// Requested state.
        to: LifecycleState,
    },
}

impl Error {
    /// Process exit code that identifies this failure at the process boundary.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Startup { step, .. } => step.exit_code(),
            Self::ReadyTimeout(_) => 6,
            Self::WorkerExited | Self::WorkerPanicked | Self::Spawn(_) => 7,
            Self::Reentrancy { .. } => 9,
            Self::Capability(_) | Self::JoinTimeout(_) | Self::InvalidState { .. } => 1,
        }
    }
}
