//! Session identity and the handle the registry owns for each audio session.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    capability::{SessionControl, SessionEventSink},
    error::CapabilityError,
};

/// Process that owns an audio session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionOwner {
    /// The session belongs to exactly one process.
    Process(u32),
    /// The session is not attributable to a single process (cross-process or
    /// system sounds). Shared sessions are never muted or unmuted.
    Shared,
}

impl SessionOwner {
    /// The owning process id, if the session has a single owner.
    pub fn pid(self) -> Option<u32> {
        match self {
            Self::Process(pid) => Some(pid),
            Self::Shared => None,
        }
    }
}

impl fmt::Display for SessionOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process(pid) => write!(f, "{pid}"),
            Self::Shared => f.write_str("shared"),
        }
    }
}

/// Identity of one logical audio session, used for deduplication.
///
/// The instance id distinguishes otherwise identical sessions opened more than
/// once by the same process. Identity is fixed at registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionIdentity {
    /// Owning process or shared.
    owner: SessionOwner,
    /// Capability-assigned session identifier.
    session_id: String,
    /// Distinguishes repeated sessions of one process.
    instance_id: String,
}

impl SessionIdentity {
    /// Build an identity from its three components.
    pub fn new(
        owner: SessionOwner,
        session_id: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            owner,
            session_id: session_id.into(),
            instance_id: instance_id.into(),
        }
    }

    /// Owning process, or [`SessionOwner::Shared`].
    pub fn owner(&self) -> SessionOwner {
        self.owner
    }

    /// Session identifier string.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Session instance identifier string.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.instance_id)
    }
}

/// Everything the audio capability reports about one session.
pub struct SessionDescriptor {
    /// Identity derived from the session's owner and identifiers.
    pub identity: SessionIdentity,
    /// Display name, possibly empty. Diagnostics only.
    pub display_name: String,
    /// Control object for the session.
    pub control: Box<dyn SessionControl>,
}

impl fmt::Debug for SessionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDescriptor")
            .field("identity", &self.identity)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Shared state behind a [`SessionHandle`].
struct HandleInner {
    /// Fixed identity.
    identity: SessionIdentity,
    /// Name at registration.
    display_name: String,
    /// Capability control object.
    control: Box<dyn SessionControl>,
    /// Whether a property sink is registered.
    registered: AtomicBool,
}

/// Reference-counted handle to one session's control object.
///
/// The registry's copy keeps the underlying control alive; clones handed out by
/// [`crate::SessionRegistry::sessions_for`] share the same control.
#[derive(Clone)]
pub struct SessionHandle {
    /// Shared state.
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    /// Wrap a descriptor reported by the capability.
    pub fn new(descriptor: SessionDescriptor) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                identity: descriptor.identity,
                display_name: descriptor.display_name,
                control: descriptor.control,
                registered: AtomicBool::new(false),
            }),
        }
    }

    /// Identity assigned at registration.
    pub fn identity(&self) -> &SessionIdentity {
        &self.inner.identity
    }

    /// Owning process, or shared.
    pub fn owner(&self) -> SessionOwner {
        self.inner.identity.owner()
    }

    /// Display name captured when the session was first observed.
    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    /// True while a per-session notification is registered.
    pub fn is_registered(&self) -> bool {
        self.inner.registered.load(Ordering::Acquire)
    }

    /// Set the session's mute state.
    pub fn set_mute(&self, muted: bool) -> Result<(), CapabilityError> {
        self.inner.control.set_mute(muted)
    }

    /// Register a per-session notification sink. Idempotent.
    pub(crate) fn register_events(&self, sink: SessionEventSink) -> Result<(), CapabilityError> {
        if self.inner.registered.load(Ordering::Acquire) {
            return Ok(());
        }
        self.inner.control.register_events(sink)?;
        self.inner.registered.store(true, Ordering::Release);
        Ok(())
    }

    /// Unregister the per-session notification if one is registered.
    pub(crate) fn unregister_events(&self) -> Result<(), CapabilityError> {
        if !self.inner.registered.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.control.unregister_events()
    }

    /// True if both handles refer to the same underlying control.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("identity", &self.inner.identity)
            .field("display_name", &self.inner.display_name)
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn instance_id_distinguishes_sessions_of_one_process() {
        let a = SessionIdentity::new(SessionOwner::Process(7), "app", "inst-1");
        let b = SessionIdentity::new(SessionOwner::Process(7), "app", "inst-2");
        let a2 = SessionIdentity::new(SessionOwner::Process(7), "app", "inst-1");
        let set: HashSet<_> = [a.clone(), b, a2].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&a));
    }

    #[test]
    fn shared_owner_has_no_pid() {
        assert_eq!(SessionOwner::Shared.pid(), None);
        assert_eq!(SessionOwner::Process(3).pid(), Some(3));
        assert_eq!(SessionOwner::Shared.to_string(), "shared");
    }
}
