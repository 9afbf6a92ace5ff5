//! Keeps the session registry in step with the audio capability.
//!
//! Startup order matters: the creation notification is registered before the
//! existing sessions are enumerated, so a session created in between is seen
//! by at least one of the two paths. The registry's identity check collapses
//! the case where it is seen by both.
//!
//! Notification callbacks never unregister anything. A disconnected session is
//! retired in the registry and its listener is released later on the worker by
//! [`SessionTracker::release_retired`] or [`SessionTracker::shutdown`].

use std::{
    result::Result as StdResult,
    sync::{Arc, Weak},
};

use tracing::{debug, info, trace, warn};

use crate::{
    capability::{AudioSessions, SessionEvent, SessionEventSink, SessionState},
    error::{CapabilityError, Error, Result, TrackerStep},
    registry::{Registration, SessionRegistry},
    session::{SessionDescriptor, SessionHandle, SessionIdentity},
};

/// Populates the registry at startup and on session-created notifications.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct SessionTracker {
    /// Registry being maintained.
    registry: Arc<SessionRegistry>,
}

impl SessionTracker {
    /// Create a tracker feeding `registry`.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this tracker maintains.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Register for creation notifications, then register every existing
    /// session. Returns the number of sessions registered by enumeration.
    ///
    /// On failure everything already registered is unwound before the error is
    /// returned, and the error names the step that failed.
    pub fn start<C>(&self, caps: &C) -> Result<usize>
    where
        C: AudioSessions + ?Sized,
    {
        let tracker = self.clone();
        caps.register_session_created(Arc::new(move |descriptor| {
            tracker.on_session_created(descriptor)
        }))
        .map_err(|source| startup(TrackerStep::RegisterSessionCreated, source))?;

        let descriptors = match caps.enumerate_sessions() {
            Ok(d) => d,
            Err(source) => {
                self.shutdown(caps);
                return Err(startup(TrackerStep::EnumerateSessions, source));
            }
        };

        debug!(count = descriptors.len(), "sessions_enumerated");
        let mut inserted = 0;
        for descriptor in descriptors {
            match self.register(descriptor) {
                Ok(Registration::Inserted) => inserted += 1,
                Ok(Registration::Duplicate | Registration::Closed) => {}
                Err(source) => {
                    self.shutdown(caps);
                    return Err(startup(TrackerStep::RegisterSessionEvents, source));
                }
            }
        }

        info!(
            sessions = self.registry.len(),
            shared = self.registry.shared_count(),
            "session_tracker_ready"
        );
        Ok(inserted)
    }

    /// Handle a session-created notification. May run on any thread,
    /// concurrently with startup enumeration and with mute transitions.
    pub fn on_session_created(&self, descriptor: SessionDescriptor) {
        let identity = descriptor.identity.clone();
        match self.register(descriptor) {
            Ok(Registration::Inserted) => debug!(session = %identity, "session_created"),
            Ok(Registration::Duplicate) => trace!(session = %identity, "session_created_duplicate"),
            Ok(Registration::Closed) => debug!(session = %identity, "session_created_after_shutdown"),
            Err(e) => warn!(session = %identity, error = %e, "session_events_register_failed"),
        }
    }

    /// Unregister the listeners of sessions removed by a disconnect since the
    /// last call. Runs on the worker, outside any notification callback.
    pub fn release_retired(&self) -> usize {
        let retired = self.registry.take_retired();
        let count = retired.len();
        for handle in retired {
            unregister(&handle);
        }
        if count > 0 {
            debug!(count, "retired_sessions_released");
        }
        count
    }

    /// Close the registry, unregister the creation notification and every
    /// per-session notification, then release all handles.
    ///
    /// A creation callback already in flight finds the registry closed and
    /// releases its session without keeping a listener attached.
    pub fn shutdown<C>(&self, caps: &C)
    where
        C: AudioSessions + ?Sized,
    {
        self.registry.close();
        if let Err(e) = caps.unregister_session_created() {
            warn!(error = %e, "session_created_unregister_failed");
        }
        let handles = self.registry.drain_all();
        let count = handles.len();
        for handle in handles {
            unregister(&handle);
        }
        debug!(count, "session_tracker_released");
    }

    /// Insert one session and, if it is new, attach its property listener.
    ///
    /// A listener that fails to attach leaves the session registered: it can
    /// still be muted, it just will not report disconnects.
    fn register(&self, descriptor: SessionDescriptor) -> StdResult<Registration, CapabilityError> {
        let handle = SessionHandle::new(descriptor);
        let registration = self.registry.try_register(handle.clone());
        if registration == Registration::Inserted {
            trace!(
                session = %handle.identity(),
                name = handle.display_name(),
                "session_registered"
            );
            handle.register_events(session_sink(&self.registry, handle.identity().clone()))?;
            // Teardown may have drained the handle before the listener was
            // attached, in which case nothing else will detach it.
            if self.registry.is_closed() {
                unregister(&handle);
                return Ok(Registration::Closed);
            }
        }
        Ok(registration)
    }
}

/// Unregister one session's listener, logging a failure.
fn unregister(handle: &SessionHandle) {
    if let Err(e) = handle.unregister_events() {
        warn!(session = %handle.identity(), error = %e, "session_events_unregister_failed");
    }
}

/// Build the per-session listener. It closes over the session's identity, so a
/// disconnect names exactly one registry entry, and holds the registry weakly
/// so a listener the platform keeps alive does not pin the registry.
fn session_sink(registry: &Arc<SessionRegistry>, identity: SessionIdentity) -> SessionEventSink {
    let registry = Arc::downgrade(registry);
    Arc::new(move |event| on_session_event(&registry, &identity, event))
}

/// Apply one property-change notification for `identity`.
fn on_session_event(registry: &Weak<SessionRegistry>, identity: &SessionIdentity, event: SessionEvent) {
    match event {
        SessionEvent::SimpleVolumeChanged { volume, muted } => {
            debug!(session = %identity, volume, muted, "session_volume_changed")
        }
        SessionEvent::StateChanged(SessionState::Expired) => {
            debug!(session = %identity, "session_expired");
            purge(registry, identity);
        }
        SessionEvent::StateChanged(state) => {
            debug!(session = %identity, ?state, "session_state_changed")
        }
        SessionEvent::Disconnected(reason) => {
            debug!(session = %identity, %reason, "session_disconnected");
            purge(registry, identity);
        }
        other => trace!(session = %identity, event = ?other, "session_property_changed"),
    }
}

/// Retire the registry's handle for `identity`, if the registry still exists.
fn purge(registry: &Weak<SessionRegistry>, identity: &SessionIdentity) {
    let Some(registry) = registry.upgrade() else {
        return;
    };
    if registry.retire(identity) {
        debug!(session = %identity, remaining = registry.len(), "session_removed");
    }
}

/// Wrap a capability failure with the startup step it happened in.
fn startup(step: TrackerStep, source: CapabilityError) -> Error {
    warn!(%step, code = source.code, error = %source, "session_tracker_start_failed");
    Error::Startup { step, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capability::DisconnectReason,
        session::SessionOwner,
        test_support::{MockAudioSessions, MockStep},
    };

    fn tracker() -> SessionTracker {
        SessionTracker::new(Arc::new(SessionRegistry::new()))
    }

    #[test]
    fn start_registers_existing_sessions_and_listeners() {
        let mock = MockAudioSessions::new();
        let a = mock.add_for_pid(10, "a");
        let shared = mock.add_session(SessionOwner::Shared, "mixer", "m");
        let t = tracker();
        assert_eq!(t.start(&mock).unwrap(), 2);
        assert!(mock.has_created_sink());
        assert!(a.has_sink());
        assert!(shared.has_sink());
        assert_eq!(t.registry().sessions_for(10).len(), 1);
        assert_eq!(t.registry().shared_count(), 1);
    }

    #[test]
    fn created_notification_registers_new_session() {
        let mock = MockAudioSessions::new();
        let t = tracker();
        t.start(&mock).unwrap();
        let late = mock.session(SessionOwner::Process(22), "late", "1");
        assert!(mock.announce(&late));
        assert_eq!(t.registry().sessions_for(22).len(), 1);
        assert!(late.has_sink());
    }

    #[test]
    fn enumeration_failure_unwinds_creation_sink() {
        let mock = MockAudioSessions::new();
        mock.add_for_pid(1, "a");
        mock.fail_at(MockStep::EnumerateSessions);
        let t = tracker();
        let err = t.start(&mock).unwrap_err();
        assert!(matches!(
            err,
            Error::Startup {
                step: TrackerStep::EnumerateSessions,
                ..
            }
        ));
        assert!(!mock.has_created_sink());
        assert_eq!(mock.unregister_created_calls(), 1);
        assert!(t.registry().is_empty());
    }

    #[test]
    fn listener_failure_unwinds_registered_sessions() {
        let mock = MockAudioSessions::new();
        let good = mock.add_for_pid(1, "good");
        let bad = mock.add_for_pid(2, "bad");
        bad.fail_register(true);
        let t = tracker();
        let err = t.start(&mock).unwrap_err();
        assert_eq!(err.exit_code(), TrackerStep::RegisterSessionEvents.exit_code());
        assert!(t.registry().is_empty());
        assert!(!good.has_sink());
        assert_eq!(good.live_controls(), 0);
        assert_eq!(bad.live_controls(), 0);
    }

    #[test]
    fn register_created_failure_is_reported_first() {
        let mock = MockAudioSessions::new();
        mock.fail_at(MockStep::RegisterSessionCreated);
        let err = tracker().start(&mock).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn disconnect_removes_only_that_session() {
        let mock = MockAudioSessions::new();
        let a = mock.add_for_pid(5, "a");
        let b = mock.add_for_pid(5, "b");
        let t = tracker();
        t.start(&mock).unwrap();
        assert!(a.fire(SessionEvent::Disconnected(DisconnectReason::FormatChanged)));
        let left = t.registry().sessions_for(5);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].identity(), b.identity());
        assert!(b.fire(SessionEvent::StateChanged(SessionState::Expired)));
        assert!(t.registry().is_empty());
    }

    #[test]
    fn property_changes_do_not_touch_registry() {
        let mock = MockAudioSessions::new();
        let a = mock.add_for_pid(5, "a");
        let t = tracker();
        t.start(&mock).unwrap();
        a.fire(SessionEvent::SimpleVolumeChanged {
            volume: 0.5,
            muted: true,
        });
        a.fire(SessionEvent::StateChanged(SessionState::Inactive));
        a.fire(SessionEvent::DisplayNameChanged("x".into()));
        assert_eq!(t.registry().len(), 1);
    }

    #[test]
    fn disconnected_listener_is_released_on_worker() {
        let mock = MockAudioSessions::new();
        let a = mock.add_for_pid(5, "a");
        let t = tracker();
        t.start(&mock).unwrap();
        assert!(a.fire(SessionEvent::Disconnected(DisconnectReason::DeviceRemoval)));
        assert!(t.registry().is_empty());
        // Still attached until the worker gets to it.
        assert!(a.has_sink());
        assert_eq!(a.unregister_calls(), 0);
        assert_eq!(t.release_retired(), 1);
        assert_eq!(a.unregister_calls(), 1);
        assert!(!a.has_sink());
        assert_eq!(a.live_controls(), 0);
        assert_eq!(t.release_retired(), 0);
    }

    #[test]
    fn shutdown_releases_disconnected_listeners() {
        let mock = MockAudioSessions::new();
        let a = mock.add_for_pid(5, "a");
        let b = mock.add_for_pid(6, "b");
        let t = tracker();
        t.start(&mock).unwrap();
        a.fire(SessionEvent::Disconnected(DisconnectReason::DeviceRemoval));
        t.shutdown(&mock);
        assert_eq!(a.unregister_calls(), 1);
        assert_eq!(b.unregister_calls(), 1);
        assert!(!a.has_sink());
        assert_eq!(a.live_controls(), 0);
    }

    #[test]
    fn creation_after_shutdown_is_refused() {
        let mock = MockAudioSessions::new();
        let t = tracker();
        t.start(&mock).unwrap();
        let sink = mock.created_sink().unwrap();
        t.shutdown(&mock);
        let late = mock.session(SessionOwner::Process(31), "late", "1");
        sink(late.descriptor());
        assert!(t.registry().is_empty());
        assert!(!late.has_sink());
        assert_eq!(late.register_calls(), 0);
        assert_eq!(late.live_controls(), 0);
    }

    #[test]
    fn shutdown_during_listener_attach_detaches_it() {
        let mock = MockAudioSessions::new();
        let t = tracker();
        t.start(&mock).unwrap();
        let late = mock.session(SessionOwner::Process(32), "late", "1");
        let (tc, mc) = (t.clone(), mock.clone());
        late.during_register(move || tc.shutdown(&mc));
        assert!(mock.announce(&late));
        assert!(t.registry().is_empty());
        assert_eq!(late.register_calls(), 1);
        assert_eq!(late.unregister_calls(), 1);
        assert!(!late.has_sink());
        assert_eq!(late.live_controls(), 0);
    }

    #[test]
    fn shutdown_releases_everything() {
        let mock = MockAudioSessions::new();
        let a = mock.add_for_pid(5, "a");
        let t = tracker();
        t.start(&mock).unwrap();
        t.shutdown(&mock);
        assert!(t.registry().is_empty());
        assert!(!mock.has_created_sink());
        assert_eq!(a.unregister_calls(), 1);
        assert_eq!(a.live_controls(), 0);
    }
}
