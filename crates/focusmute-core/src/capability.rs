//! Narrow interfaces to the platform audio-session capability.
//!
//! The core never talks to the OS directly. A platform crate implements
//! [`AudioSessions`] (owned by the worker thread that created it) and
//! [`SessionControl`] (one per session, shareable across threads so that
//! notification callbacks arriving on capability-owned threads can use it).

use std::{fmt, sync::Arc};

use crate::{error::CapabilityError, session::SessionDescriptor};

/// Activity state of a session as reported by the capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No stream is open or all streams are stopped.
    Inactive,
    /// At least one stream is running.
    Active,
    /// The session has no remaining streams and will not be reused.
    Expired,
}

/// Reason a session was disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The endpoint device was removed.
    DeviceRemoval,
    /// The audio service stopped.
    ServerShutdown,
    /// The stream format changed.
    FormatChanged,
    /// The user logged off.
    SessionLogoff,
    /// The remote desktop session was disconnected.
    SessionDisconnected,
    /// An exclusive-mode stream took over the device.
    ExclusiveModeOverride,
    /// A reason code this crate does not know.
    Other(i32),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceRemoval => f.write_str("device removed"),
            Self::ServerShutdown => f.write_str("server shut down"),
            Self::FormatChanged => f.write_str("format changed"),
            Self::SessionLogoff => f.write_str("user logged off"),
            Self::SessionDisconnected => f.write_str("session disconnected"),
            Self::ExclusiveModeOverride => f.write_str("exclusive-mode override"),
            Self::Other(code) => write!(f, "unknown ({code})"),
        }
    }
}

/// Property-change notification for one session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Display name changed.
    DisplayNameChanged(String),
    /// Icon path changed.
    IconPathChanged(String),
    /// Master volume or mute changed.
    SimpleVolumeChanged {
        /// New volume in `0.0..=1.0`.
        volume: f32,
        /// New mute state.
        muted: bool,
    },
    /// A channel volume changed.
    ChannelVolumeChanged {
        /// Number of channels.
        channel_count: u32,
        /// Index of the changed channel.
        changed_channel: u32,
    },
    /// Grouping parameter changed.
    GroupingParamChanged,
    /// Session activity state changed.
    StateChanged(SessionState),
    /// Session was disconnected and its control is no longer usable.
    Disconnected(DisconnectReason),
}

/// Callback invoked for each property change of one session.
pub type SessionEventSink = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Callback invoked when the capability observes a newly created session.
pub type SessionCreatedSink = Arc<dyn Fn(SessionDescriptor) + Send + Sync>;

/// Control surface for a single session.
pub trait SessionControl: Send + Sync {
    /// Set the session's mute state.
    fn set_mute(&self, muted: bool) -> Result<(), CapabilityError>;
    /// Register `sink` for this session's property changes.
    fn register_events(&self, sink: SessionEventSink) -> Result<(), CapabilityError>;
    /// Remove the sink registered by [`SessionControl::register_events`].
    fn unregister_events(&self) -> Result<(), CapabilityError>;
}

/// Session enumeration and creation notifications for the default render device.
///
/// Implementations may be thread-affine: the worker that acquired the
/// capability is the only thread that calls these methods.
pub trait AudioSessions {
    /// Enumerate every session that currently exists.
    fn enumerate_sessions(&self) -> Result<Vec<SessionDescriptor>, CapabilityError>;
    /// Register `sink` to be called for each newly created session.
    fn register_session_created(&self, sink: SessionCreatedSink) -> Result<(), CapabilityError>;
    /// Remove the sink registered by [`AudioSessions::register_session_created`].
    fn unregister_session_created(&self) -> Result<(), CapabilityError>;
}
