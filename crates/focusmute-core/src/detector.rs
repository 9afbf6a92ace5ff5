//! Detection-context state: turns foreground-process observations into
//! [`FocusEvent`]s.
//!
//! This module can reach the event queue and nothing else. It has no access to
//! the audio capability or the registry, so the detection callback cannot
//! issue a mute call even by accident.

use std::cell::Cell;

use tracing::{error, trace};

use crate::{
    error::{Error, Result},
    queue::{FocusEvent, FocusEventSender},
};

/// What [`FocusDetector::on_foreground`] did with one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// A switch was queued.
    Enqueued(FocusEvent),
    /// The foreground process did not change.
    SameProcess,
    /// The foreground window could not be resolved to a process.
    NullProcess,
    /// No process was seen yet; this one was recorded without an event.
    Primed,
    /// The queue is shut down; the switch was recorded but not queued.
    Dropped,
    /// The callback re-entered past the configured limit. The program should
    /// terminate.
    Abort {
        /// Nesting depth observed.
        depth: u32,
    },
}

/// Tracks the last foreground process and the callback nesting depth.
///
/// Not `Sync`: it lives on the thread that receives foreground notifications,
/// and those are serialized by the OS.
pub struct FocusDetector {
    /// Where switches go.
    sender: FocusEventSender,
    /// Last foreground process, zero if unknown.
    last_pid: Cell<u32>,
    /// Active callback frames.
    depth: Cell<u32>,
    /// Tolerated nested frames.
    limit: u32,
}

/// Marks one active callback frame. Dropping it leaves the frame.
pub struct DepthGuard<'a> {
    /// The detector's frame counter.
    depth: &'a Cell<u32>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl FocusDetector {
    /// Create a detector that reports switches away from `initial_pid`.
    /// `limit` is the number of nested callback frames tolerated beyond the
    /// outermost one.
    pub fn new(sender: FocusEventSender, initial_pid: u32, limit: u32) -> Self {
        Self {
            sender,
            last_pid: Cell::new(initial_pid),
            depth: Cell::new(0),
            limit,
        }
    }

    /// Last foreground process seen, or zero if none.
    pub fn last_pid(&self) -> u32 {
        self.last_pid.get()
    }

    /// Enter a callback frame. Fails with [`Error::Reentrancy`] once nesting
    /// exceeds the limit.
    pub fn enter(&self) -> Result<DepthGuard<'_>> {
        let depth = self.depth.get() + 1;
        self.depth.set(depth);
        let guard = DepthGuard { depth: &self.depth };
        let nested = depth - 1;
        if nested > self.limit {
            return Err(Error::Reentrancy {
                depth: nested,
                limit: self.limit,
            });
        }
        Ok(guard)
    }

    /// Record that `pid` now owns the foreground window.
    pub fn on_foreground(&self, pid: u32) -> Detection {
        let _frame = match self.enter() {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "detection_reentered");
                let depth = match e {
                    Error::Reentrancy { depth, .. } => depth,
                    _ => self.depth.get(),
                };
                return Detection::Abort { depth };
            }
        };
        self.observe(pid)
    }

    /// Classify `pid` against the last seen process. Must run inside a frame.
    fn observe(&self, pid: u32) -> Detection {
        if pid == 0 {
            trace!("foreground_without_process");
            return Detection::NullProcess;
        }
        let old = self.last_pid.get();
        if old == pid {
            return Detection::SameProcess;
        }
        self.last_pid.set(pid);
        if old == 0 {
            trace!(pid, "foreground_primed");
            return Detection::Primed;
        }
        let event = FocusEvent::new(old, pid);
        if self.sender.send(event) {
            trace!(old, new = pid, "focus_switch");
            Detection::Enqueued(event)
        } else {
            Detection::Dropped
        }
    }
}
