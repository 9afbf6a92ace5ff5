//! Core of focusmute: keeps every process muted except the one with focus.
//!
//! The pieces, leaves first:
//!
//! - [`SessionIdentity`] and [`SessionHandle`] describe one audio session.
//! - [`SessionRegistry`] maps process ids to the sessions they own.
//! - [`SessionTracker`] fills the registry at startup and keeps it current
//!   from the capability's creation and disconnect notifications.
//! - [`FocusEventQueue`] carries focus switches from the detection context to
//!   the worker. [`FocusDetector`] is the detection side.
//! - [`MuteCoordinator`] applies each switch to the registry.
//! - [`Lifecycle`] runs the worker thread and its startup handshake.
//!
//! The platform is reached only through the traits in [`capability`]; see the
//! `win-audio-sessions` crate for the Windows implementation and
//! `test_support` (feature `test-utils`) for an in-memory one.

pub mod capability;
mod coordinator;
mod detector;
mod error;
mod lifecycle;
mod queue;
mod registry;
mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
mod tracker;

pub use capability::{
    AudioSessions, DisconnectReason, SessionControl, SessionCreatedSink, SessionEvent,
    SessionEventSink, SessionState,
};
pub use coordinator::{MuteCoordinator, Outcome, SkipReason, TransitionReport};
pub use detector::{DepthGuard, Detection, FocusDetector};
pub use error::{CapabilityError, Error, Result, TrackerStep};
pub use lifecycle::{Lifecycle, LifecycleSettings, LifecycleState, WORKER_THREAD_NAME};
pub use queue::{FocusEvent, FocusEventQueue, FocusEventSender, Wake};
pub use registry::{Registration, SessionRegistry};
pub use session::{SessionDescriptor, SessionHandle, SessionIdentity, SessionOwner};
pub use tracker::SessionTracker;
