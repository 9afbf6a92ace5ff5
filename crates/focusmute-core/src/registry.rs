//! Concurrent registry of audio sessions keyed by owning process.
//!
//! One lock guards the per-process map, the shared-session list, and the
//! identity set, so no reader ever observes a half-updated mapping. Handles
//! leave the lock as clones; capability calls are made on those clones after
//! the lock is released.
//!
//! Handles removed by a disconnect are parked on a retired list until the
//! worker unregisters their notifications. Once closed, the registry refuses
//! new sessions.

use std::{
    collections::{HashMap, HashSet},
    mem,
};

use parking_lot::Mutex;
use tracing::trace;

use crate::session::{SessionHandle, SessionIdentity, SessionOwner};

/// Result of [`SessionRegistry::try_register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The session was new and is now owned by the registry.
    Inserted,
    /// A session with the same identity is already registered; the offered
    /// handle was released.
    Duplicate,
    /// The registry is closed for teardown; the offered handle was released.
    Closed,
}

/// State guarded by the registry lock.
#[derive(Default)]
struct Inner {
    /// Sessions with a single owning process.
    by_pid: HashMap<u32, Vec<SessionHandle>>,
    /// Cross-process and system sessions. Tracked for teardown only.
    shared: Vec<SessionHandle>,
    /// Identity of every handle in `by_pid` and `shared`.
    identities: HashSet<SessionIdentity>,
    /// Removed handles whose notifications are still registered.
    retired: Vec<SessionHandle>,
    /// Set at teardown; no further inserts.
    closed: bool,
}

impl Inner {
    /// Remove the handle for `identity` from whichever list holds it.
    fn take(&mut self, identity: &SessionIdentity) -> Option<SessionHandle> {
        if !self.identities.remove(identity) {
            return None;
        }
        let list = match identity.owner() {
            SessionOwner::Process(pid) => self.by_pid.get_mut(&pid)?,
            SessionOwner::Shared => &mut self.shared,
        };
        let pos = list.iter().position(|h| h.identity() == identity)?;
        let handle = list.swap_remove(pos);
        if let SessionOwner::Process(pid) = identity.owner()
            && list.is_empty()
        {
            self.by_pid.remove(&pid);
        }
        Some(handle)
    }
}

/// Mapping from process id to the sessions that process owns.
#[derive(Default)]
pub struct SessionRegistry {
    /// All state, under the registry lock.
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `handle` unless a session with the same identity is present.
    ///
    /// A duplicate is the expected race between startup enumeration and the
    /// creation-notification stream. The duplicate handle is dropped after the
    /// lock is released.
    pub fn try_register(&self, handle: SessionHandle) -> Registration {
        let mut inner = self.inner.lock();
        if inner.closed {
            drop(inner);
            trace!(session = %handle.identity(), "session_registry_closed");
            return Registration::Closed;
        }
        if inner.identities.contains(handle.identity()) {
            drop(inner);
            trace!(session = %handle.identity(), "session_duplicate");
            return Registration::Duplicate;
        }
        inner.identities.insert(handle.identity().clone());
        match handle.owner() {
            SessionOwner::Process(pid) => inner.by_pid.entry(pid).or_default().push(handle),
            SessionOwner::Shared => inner.shared.push(handle),
        }
        Registration::Inserted
    }

    /// Snapshot of the sessions owned by `pid`. Shared sessions are never
    /// returned.
    pub fn sessions_for(&self, pid: u32) -> Vec<SessionHandle> {
        self.inner
            .lock()
            .by_pid
            .get(&pid)
            .cloned()
            .unwrap_or_default()
    }

    /// The registered handle for `identity`, if any.
    pub fn get(&self, identity: &SessionIdentity) -> Option<SessionHandle> {
        let inner = self.inner.lock();
        let list = match identity.owner() {
            SessionOwner::Process(pid) => inner.by_pid.get(&pid)?,
            SessionOwner::Shared => &inner.shared,
        };
        list.iter().find(|h| h.identity() == identity).cloned()
    }

    /// Remove `identity` from the registry. Returns the registry's handle so
    /// the caller releases it outside the lock. Removing an unknown identity is
    /// a no-op.
    pub fn remove(&self, identity: &SessionIdentity) -> Option<SessionHandle> {
        self.inner.lock().take(identity)
    }

    /// Remove `identity` and park its handle until [`Self::take_retired`].
    /// Used from notification callbacks, where unregistering is not allowed.
    /// Returns false if `identity` was not registered.
    pub fn retire(&self, identity: &SessionIdentity) -> bool {
        let mut inner = self.inner.lock();
        match inner.take(identity) {
            Some(handle) => {
                inner.retired.push(handle);
                true
            }
            None => false,
        }
    }

    /// Take every retired handle.
    pub fn take_retired(&self) -> Vec<SessionHandle> {
        mem::take(&mut self.inner.lock().retired)
    }

    /// Refuse further registrations. Idempotent.
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    /// True once [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// True if `identity` is registered.
    pub fn contains(&self, identity: &SessionIdentity) -> bool {
        self.inner.lock().identities.contains(identity)
    }

    /// Visit every registered handle, shared sessions included, under the lock.
    ///
    /// The visitor must not call back into the registry.
    pub fn for_each(&self, mut visit: impl FnMut(&SessionHandle)) {
        let inner = self.inner.lock();
        inner
            .by_pid
            .values()
            .flatten()
            .chain(inner.shared.iter())
            .for_each(&mut visit);
    }

    /// Remove and return every handle, retired ones included. Used at teardown
    /// so notifications can be unregistered without holding the lock.
    pub fn drain_all(&self) -> Vec<SessionHandle> {
        let mut inner = self.inner.lock();
        inner.identities.clear();
        let mut out: Vec<SessionHandle> = inner.by_pid.drain().flat_map(|(_, v)| v).collect();
        out.append(&mut inner.shared);
        out.append(&mut inner.retired);
        out
    }

    /// Number of registered sessions, shared sessions included.
    pub fn len(&self) -> usize {
        self.inner.lock().identities.len()
    }

    /// True if no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of registered shared sessions.
    pub fn shared_count(&self) -> usize {
        self.inner.lock().shared.len()
    }

    /// Process ids that currently own at least one session.
    pub fn pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.inner.lock().by_pid.keys().copied().collect();
        pids.sort_unstable();
        pids
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::test_support::MockAudioSessions;

    fn handle(mock: &MockAudioSessions, owner: SessionOwner, inst: &str) -> SessionHandle {
        let s = mock.session(owner, "app", inst);
        SessionHandle::new(s.descriptor())
    }

    #[test]
    fn duplicate_registration_keeps_first_handle() {
        let mock = MockAudioSessions::new();
        let reg = SessionRegistry::new();
        let first = handle(&mock, SessionOwner::Process(10), "a");
        let second = handle(&mock, SessionOwner::Process(10), "a");
        assert_eq!(reg.try_register(first.clone()), Registration::Inserted);
        assert_eq!(reg.try_register(second.clone()), Registration::Duplicate);
        assert_eq!(reg.len(), 1);
        let got = reg.sessions_for(10);
        assert_eq!(got.len(), 1);
        assert!(got[0].ptr_eq(&first));
        assert!(!got[0].ptr_eq(&second));
    }

    #[test]
    fn shared_sessions_are_not_listed_under_any_process() {
        let mock = MockAudioSessions::new();
        let reg = SessionRegistry::new();
        reg.try_register(handle(&mock, SessionOwner::Shared, "sys"));
        reg.try_register(handle(&mock, SessionOwner::Process(4), "p"));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.shared_count(), 1);
        assert_eq!(reg.pids(), vec![4]);
        assert!(reg.sessions_for(0).is_empty());
    }

    #[test]
    fn remove_clears_identity_and_mapping() {
        let mock = MockAudioSessions::new();
        let reg = SessionRegistry::new();
        let h = handle(&mock, SessionOwner::Process(5), "x");
        let id = h.identity().clone();
        reg.try_register(h);
        assert!(reg.remove(&id).is_some());
        assert!(!reg.contains(&id));
        assert!(reg.sessions_for(5).is_empty());
        assert!(reg.pids().is_empty());
        assert!(reg.remove(&id).is_none());

        // Re-registration after removal is accepted.
        assert_eq!(
            reg.try_register(handle(&mock, SessionOwner::Process(5), "x")),
            Registration::Inserted
        );
    }

    #[test]
    fn drain_all_empties_everything() {
        let mock = MockAudioSessions::new();
        let reg = SessionRegistry::new();
        reg.try_register(handle(&mock, SessionOwner::Process(1), "a"));
        reg.try_register(handle(&mock, SessionOwner::Process(1), "b"));
        reg.try_register(handle(&mock, SessionOwner::Shared, "c"));
        let mut seen = 0;
        reg.for_each(|_| seen += 1);
        assert_eq!(seen, 3);
        assert_eq!(reg.drain_all().len(), 3);
        assert!(reg.is_empty());
        assert_eq!(reg.shared_count(), 0);
    }

    #[test]
    fn retired_handles_are_held_until_taken() {
        let mock = MockAudioSessions::new();
        let reg = SessionRegistry::new();
        let h = handle(&mock, SessionOwner::Process(3), "r");
        let id = h.identity().clone();
        reg.try_register(h);
        assert!(reg.retire(&id));
        assert!(!reg.contains(&id));
        assert!(!reg.retire(&id));
        let retired = reg.take_retired();
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].identity(), &id);
        assert!(reg.take_retired().is_empty());
    }

    #[test]
    fn drain_all_includes_retired() {
        let mock = MockAudioSessions::new();
        let reg = SessionRegistry::new();
        let h = handle(&mock, SessionOwner::Process(3), "r");
        let id = h.identity().clone();
        reg.try_register(h);
        reg.try_register(handle(&mock, SessionOwner::Process(4), "s"));
        reg.retire(&id);
        assert_eq!(reg.drain_all().len(), 2);
        assert!(reg.take_retired().is_empty());
    }

    #[test]
    fn closed_registry_refuses_inserts() {
        let mock = MockAudioSessions::new();
        let reg = SessionRegistry::new();
        reg.close();
        assert!(reg.is_closed());
        let s = mock.session(SessionOwner::Process(9), "app", "late");
        assert_eq!(
            reg.try_register(SessionHandle::new(s.descriptor())),
            Registration::Closed
        );
        assert!(reg.is_empty());
        assert_eq!(s.live_controls(), 0);
    }

    proptest! {
        #[test]
        fn identity_set_matches_handles(ops in proptest::collection::vec((0u8..3, 0u32..4, 0u8..3), 0..64)) {
            let mock = MockAudioSessions::new();
            let reg = SessionRegistry::new();
            for (op, pid, inst) in ops {
                let owner = if pid == 0 { SessionOwner::Shared } else { SessionOwner::Process(pid) };
                let h = handle(&mock, owner, &inst.to_string());
                if op == 0 {
                    reg.remove(h.identity());
                } else {
                    reg.try_register(h);
                }
            }
            let mut handles = Vec::new();
            reg.for_each(|h| handles.push(h.identity().clone()));
            let total = handles.len();
            handles.sort();
            handles.dedup();
            prop_assert_eq!(handles.len(), total);
            prop_assert_eq!(reg.len(), total);
            for id in &handles {
                prop_assert!(reg.contains(id));
            }
        }
    }
}
