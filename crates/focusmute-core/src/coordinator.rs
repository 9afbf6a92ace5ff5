//! Applies focus switches to the session registry.
//!
//! The coordinator is the only code that sets a session's mute state, and it
//! only runs on the worker thread that owns the audio capability.

use std::{collections::HashSet, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    error::CapabilityError,
    queue::FocusEvent,
    registry::SessionRegistry,
    session::{SessionHandle, SessionIdentity},
};

/// Why a transition was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// One of the process ids was zero.
    NullProcess,
    /// Old and new process are the same.
    SameProcess,
}

/// Result of applying one transition.
#[derive(Debug, Default)]
pub struct TransitionReport {
    /// Sessions successfully muted.
    pub muted: usize,
    /// Sessions successfully unmuted.
    pub unmuted: usize,
    /// Sessions whose mute call failed, with the failure.
    pub failed: Vec<(SessionIdentity, CapabilityError)>,
}

impl TransitionReport {
    /// True if no mute call failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of [`MuteCoordinator::apply_transition`].
#[derive(Debug)]
pub enum Outcome {
    /// The event was rejected without touching any session.
    Skipped(SkipReason),
    /// The event was applied.
    Applied(TransitionReport),
}

/// Mutes the process that lost focus and unmutes the one that gained it.
pub struct MuteCoordinator {
    /// Where sessions are looked up.
    registry: Arc<SessionRegistry>,
    /// Sessions this coordinator muted and has not since unmuted.
    muted: HashSet<SessionIdentity>,
}

impl MuteCoordinator {
    /// Create a coordinator over `registry`.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            muted: HashSet::new(),
        }
    }

    /// Apply one focus switch. Sessions are snapshotted from the registry and
    /// the lock is released before any mute call is made.
    pub fn apply_transition(&mut self, event: FocusEvent) -> Outcome {
        let FocusEvent { old_pid, new_pid } = event;
        if old_pid == 0 || new_pid == 0 {
            debug!(old = old_pid, new = new_pid, "transition_null_process");
            return Outcome::Skipped(SkipReason::NullProcess);
        }
        if old_pid == new_pid {
            debug!(pid = old_pid, "transition_same_process");
            return Outcome::Skipped(SkipReason::SameProcess);
        }

        let mut report = TransitionReport::default();
        for handle in self.registry.sessions_for(old_pid) {
            if self.set(&handle, true, &mut report) {
                report.muted += 1;
            }
        }
        for handle in self.registry.sessions_for(new_pid) {
            if self.set(&handle, false, &mut report) {
                report.unmuted += 1;
            }
        }
        debug!(
            old = old_pid,
            new = new_pid,
            muted = report.muted,
            unmuted = report.unmuted,
            failed = report.failed.len(),
            "transition_applied"
        );
        Outcome::Applied(report)
    }

    /// Apply a drained batch in order.
    pub fn apply_batch(&mut self, batch: Vec<FocusEvent>) {
        for event in batch {
            self.apply_transition(event);
        }
        let registry = &self.registry;
        self.muted.retain(|id| registry.contains(id));
    }

    /// Unmute every session this coordinator muted that is still registered.
    pub fn restore_all(&mut self) -> TransitionReport {
        let mut report = TransitionReport::default();
        let pending: Vec<SessionIdentity> = self.muted.drain().collect();
        for identity in pending {
            let Some(handle) = self.registry.get(&identity) else {
                continue;
            };
            match handle.set_mute(false) {
                Ok(()) => report.unmuted += 1,
                Err(e) => {
                    warn!(session = %identity, error = %e, "restore_failed");
                    report.failed.push((identity, e));
                }
            }
        }
        info!(
            restored = report.unmuted,
            failed = report.failed.len(),
            "sessions_restored"
        );
        report
    }

    /// Number of sessions currently held muted by this coordinator.
    pub fn muted_count(&self) -> usize {
        self.muted.len()
    }

    /// Set one session's mute state. A failure is recorded and does not stop
    /// the caller from moving on to the next session.
    fn set(&mut self, handle: &SessionHandle, muted: bool, report: &mut TransitionReport) -> bool {
        let identity = handle.identity();
        match handle.set_mute(muted) {
            Ok(()) => {
                if muted {
                    self.muted.insert(identity.clone());
                } else {
                    self.muted.remove(identity);
                }
                true
            }
            Err(e) => {
                warn!(
                    session = %identity,
                    name = handle.display_name(),
                    muted,
                    code = e.code,
                    error = %e,
                    "mute_failed"
                );
                report.failed.push((identity.clone(), e));
                false
            }
        }
    }
}
