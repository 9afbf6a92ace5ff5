//! In-memory audio capability for tests.
//!
//! Compiled for unit tests and, with the `test-utils` feature, for the
//! integration tests in `tests/`.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use crate::{
    capability::{AudioSessions, SessionControl, SessionCreatedSink, SessionEvent, SessionEventSink},
    error::CapabilityError,
    session::{SessionDescriptor, SessionIdentity, SessionOwner},
};

/// Status code reported by injected failures.
pub const MOCK_FAILURE: i32 = 0x8000_4005_u32 as i32;

/// Observable state of one mock session, shared by every control created for it.
#[derive(Default)]
struct MockSessionState {
    /// Current mute state.
    muted: AtomicBool,
    /// Number of `set_mute` calls that reached the session.
    mute_calls: AtomicUsize,
    /// Fail every `set_mute` call when set.
    fail_mute: AtomicBool,
    /// Fail `register_events` when set.
    fail_register: AtomicBool,
    /// Sink installed by `register_events`.
    sink: Mutex<Option<SessionEventSink>>,
    /// Number of `register_events` calls.
    register_calls: AtomicUsize,
    /// Number of `unregister_events` calls.
    unregister_calls: AtomicUsize,
    /// Number of live control objects.
    live_controls: AtomicUsize,
    /// Hook run at the start of the next `register_events`.
    during_register: Mutex<Option<Box<dyn Fn() + Send>>>,
}

/// One simulated audio session.
#[derive(Clone)]
pub struct MockSession {
    /// Identity reported to the tracker.
    identity: SessionIdentity,
    /// Name reported to the tracker.
    display_name: String,
    /// State shared with every control.
    state: Arc<MockSessionState>,
}

impl MockSession {
    /// Identity reported for this session.
    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// A fresh descriptor with its own control, as the capability would
    /// produce for each enumeration or notification.
    pub fn descriptor(&self) -> SessionDescriptor {
        self.state.live_controls.fetch_add(1, Ordering::SeqCst);
        SessionDescriptor {
            identity: self.identity.clone(),
            display_name: self.display_name.clone(),
            control: Box::new(MockSessionControl {
                state: self.state.clone(),
            }),
        }
    }

    /// Current mute state.
    pub fn is_muted(&self) -> bool {
        self.state.muted.load(Ordering::SeqCst)
    }

    /// Force the mute state without counting a call.
    pub fn preset_muted(&self, muted: bool) {
        self.state.muted.store(muted, Ordering::SeqCst);
    }

    /// Number of `set_mute` calls received.
    pub fn mute_calls(&self) -> usize {
        self.state.mute_calls.load(Ordering::SeqCst)
    }

    /// Make subsequent `set_mute` calls fail.
    pub fn fail_mute(&self, fail: bool) {
        self.state.fail_mute.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `register_events` calls fail.
    pub fn fail_register(&self, fail: bool) {
        self.state.fail_register.store(fail, Ordering::SeqCst);
    }

    /// Run `hook` at the start of the next `register_events`, before the sink
    /// is installed.
    pub fn during_register(&self, hook: impl Fn() + Send + 'static) {
        *self.state.during_register.lock() = Some(Box::new(hook));
    }

    /// True while a property sink is registered.
    pub fn has_sink(&self) -> bool {
        self.state.sink.lock().is_some()
    }

    /// Number of `register_events` calls.
    pub fn register_calls(&self) -> usize {
        self.state.register_calls.load(Ordering::SeqCst)
    }

    /// Number of `unregister_events` calls.
    pub fn unregister_calls(&self) -> usize {
        self.state.unregister_calls.load(Ordering::SeqCst)
    }

    /// Number of control objects still alive for this session.
    pub fn live_controls(&self) -> usize {
        self.state.live_controls.load(Ordering::SeqCst)
    }

    /// Deliver a property-change notification. Returns false if no sink is
    /// registered.
    pub fn fire(&self, event: SessionEvent) -> bool {
        let sink = self.state.sink.lock().clone();
        match sink {
            Some(sink) => {
                sink(event);
                true
            }
            None => false,
        }
    }
}

/// Control object handed to the registry for a [`MockSession`].
struct MockSessionControl {
    /// Shared session state.
    state: Arc<MockSessionState>,
}

impl Drop for MockSessionControl {
    fn drop(&mut self) {
        self.state.live_controls.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SessionControl for MockSessionControl {
    fn set_mute(&self, muted: bool) -> Result<(), CapabilityError> {
        self.state.mute_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_mute.load(Ordering::SeqCst) {
            return Err(CapabilityError::new("set_mute", MOCK_FAILURE, "injected"));
        }
        self.state.muted.store(muted, Ordering::SeqCst);
        Ok(())
    }

    fn register_events(&self, sink: SessionEventSink) -> Result<(), CapabilityError> {
        self.state.register_calls.fetch_add(1, Ordering::SeqCst);
        let hook = self.state.during_register.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        if self.state.fail_register.load(Ordering::SeqCst) {
            return Err(CapabilityError::new(
                "register_events",
                MOCK_FAILURE,
                "injected",
            ));
        }
        *self.state.sink.lock() = Some(sink);
        Ok(())
    }

    fn unregister_events(&self) -> Result<(), CapabilityError> {
        self.state.unregister_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.sink.lock() = None;
        Ok(())
    }
}

/// Capability step that [`MockAudioSessions::fail_at`] can break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockStep {
    /// `register_session_created`
    RegisterSessionCreated,
    /// `enumerate_sessions`
    EnumerateSessions,
}

/// Shared state behind [`MockAudioSessions`].
#[derive(Default)]
struct MockInner {
    /// Sessions returned by enumeration.
    existing: Mutex<Vec<MockSession>>,
    /// Sink installed by `register_session_created`.
    created_sink: Mutex<Option<SessionCreatedSink>>,
    /// Injected step failure.
    fail_step: Mutex<Option<MockStep>>,
    /// Number of `unregister_session_created` calls.
    unregister_created_calls: AtomicUsize,
    /// Hook run inside `enumerate_sessions`, before it returns.
    during_enumerate: Mutex<Option<Box<dyn Fn() + Send>>>,
}

/// In-memory [`AudioSessions`] implementation. Cheap to clone; clones share
/// state.
#[derive(Clone, Default)]
pub struct MockAudioSessions {
    /// Shared state.
    inner: Arc<MockInner>,
}

impl MockAudioSessions {
    /// Create an empty capability.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session without making it visible to enumeration.
    pub fn session(&self, owner: SessionOwner, session_id: &str, instance_id: &str) -> MockSession {
        MockSession {
            identity: SessionIdentity::new(owner, session_id, instance_id),
            display_name: format!("{session_id} ({owner})"),
            state: Arc::new(MockSessionState::default()),
        }
    }

    /// Create a session that enumeration will report.
    pub fn add_session(&self, owner: SessionOwner, session_id: &str, instance_id: &str) -> MockSession {
        let s = self.session(owner, session_id, instance_id);
        self.inner.existing.lock().push(s.clone());
        s
    }

    /// Create an enumerable session owned by `pid` with a generated id.
    pub fn add_for_pid(&self, pid: u32, instance_id: &str) -> MockSession {
        self.add_session(SessionOwner::Process(pid), &format!("app-{pid}"), instance_id)
    }

    /// Simulate the platform announcing a newly created session. Returns false
    /// if no creation sink is registered.
    pub fn announce(&self, session: &MockSession) -> bool {
        let sink = self.inner.created_sink.lock().clone();
        match sink {
            Some(sink) => {
                sink(session.descriptor());
                true
            }
            None => false,
        }
    }

    /// Make `step` fail on its next call.
    pub fn fail_at(&self, step: MockStep) {
        *self.inner.fail_step.lock() = Some(step);
    }

    /// Run `hook` inside the next enumeration, after the snapshot is taken.
    pub fn during_enumerate(&self, hook: impl Fn() + Send + 'static) {
        *self.inner.during_enumerate.lock() = Some(Box::new(hook));
    }

    /// The registered creation sink, as the platform would hold it.
    pub fn created_sink(&self) -> Option<SessionCreatedSink> {
        self.inner.created_sink.lock().clone()
    }

    /// True while a creation sink is registered.
    pub fn has_created_sink(&self) -> bool {
        self.inner.created_sink.lock().is_some()
    }

    /// Number of `unregister_session_created` calls.
    pub fn unregister_created_calls(&self) -> usize {
        self.inner.unregister_created_calls.load(Ordering::SeqCst)
    }

    /// Return and clear an injected failure for `step`.
    fn take_failure(&self, step: MockStep) -> Option<CapabilityError> {
        let mut guard = self.inner.fail_step.lock();
        if *guard != Some(step) {
            return None;
        }
        *guard = None;
        let op = match step {
            MockStep::RegisterSessionCreated => "register_session_created",
            MockStep::EnumerateSessions => "enumerate_sessions",
        };
        Some(CapabilityError::new(op, MOCK_FAILURE, "injected"))
    }
}

impl AudioSessions for MockAudioSessions {
    fn enumerate_sessions(&self) -> Result<Vec<SessionDescriptor>, CapabilityError> {
        if let Some(e) = self.take_failure(MockStep::EnumerateSessions) {
            return Err(e);
        }
        let out: Vec<SessionDescriptor> = self
            .inner
            .existing
            .lock()
            .iter()
            .map(MockSession::descriptor)
            .collect();
        let hook = self.inner.during_enumerate.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        Ok(out)
    }

    fn register_session_created(&self, sink: SessionCreatedSink) -> Result<(), CapabilityError> {
        if let Some(e) = self.take_failure(MockStep::RegisterSessionCreated) {
            return Err(e);
        }
        *self.inner.created_sink.lock() = Some(sink);
        Ok(())
    }

    fn unregister_session_created(&self) -> Result<(), CapabilityError> {
        self.inner
            .unregister_created_calls
            .fetch_add(1, Ordering::SeqCst);
        *self.inner.created_sink.lock() = None;
        Ok(())
    }
}
