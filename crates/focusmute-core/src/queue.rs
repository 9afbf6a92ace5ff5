//! FIFO of focus switches from the detection context to the worker.
//!
//! Events are never coalesced: every switch is delivered, in arrival order.
//! The worker drains the whole queue per wake and processes it as a batch.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

/// One focus switch: `old_pid` lost the foreground, `new_pid` gained it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FocusEvent {
    /// Process that lost focus.
    pub old_pid: u32,
    /// Process that gained focus.
    pub new_pid: u32,
}

impl FocusEvent {
    /// Construct an event.
    pub fn new(old_pid: u32, new_pid: u32) -> Self {
        Self { old_pid, new_pid }
    }
}

/// What woke the worker.
#[derive(Debug, PartialEq, Eq)]
pub enum Wake {
    /// Work was available; the queue has been drained into this batch.
    Work(Vec<FocusEvent>),
    /// Shutdown was requested. `discarded` events were still queued and will
    /// not be applied.
    Quit {
        /// Number of queued events dropped at shutdown.
        discarded: usize,
    },
}

#[derive(Default)]
struct State {
    /// Pending switches, oldest first.
    events: VecDeque<FocusEvent>,
    /// Set once shutdown is requested.
    quit: bool,
}

/// Thread-safe FIFO paired with a work-available signal and a quit signal.
#[derive(Default)]
pub struct FocusEventQueue {
    /// Events and the quit flag, under one lock.
    state: Mutex<State>,
    /// Raised on enqueue and on shutdown.
    signal: Condvar,
}

impl FocusEventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `event` and raise the work signal. Returns false, dropping the
    /// event, once shutdown has been requested.
    pub fn enqueue(&self, event: FocusEvent) -> bool {
        let mut state = self.state.lock();
        if state.quit {
            return false;
        }
        state.events.push_back(event);
        drop(state);
        self.signal.notify_one();
        trace!(old = event.old_pid, new = event.new_pid, "focus_event_enqueued");
        true
    }

    /// Atomically remove and return every queued event, oldest first.
    pub fn drain_all(&self) -> Vec<FocusEvent> {
        self.state.lock().events.drain(..).collect()
    }

    /// Block until work is available or shutdown is requested. Shutdown takes
    /// precedence over pending work.
    pub fn wait(&self) -> Wake {
        let mut state = self.state.lock();
        loop {
            if state.quit {
                let discarded = state.events.len();
                state.events.clear();
                return Wake::Quit { discarded };
            }
            if !state.events.is_empty() {
                return Wake::Work(state.events.drain(..).collect());
            }
            self.signal.wait(&mut state);
        }
    }

    /// Raise the quit signal and wake the worker.
    pub fn request_shutdown(&self) {
        let mut state = self.state.lock();
        if state.quit {
            return;
        }
        state.quit = true;
        drop(state);
        self.signal.notify_all();
        debug!("focus_queue_shutdown_requested");
    }

    /// True once shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().quit
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    /// True if no events are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Enqueue-only view of a [`FocusEventQueue`].
///
/// This is all the detection context gets: it can record that a switch
/// happened, and nothing else.
#[derive(Clone)]
pub struct FocusEventSender {
    /// Target queue.
    queue: Arc<FocusEventQueue>,
}

impl FocusEventSender {
    /// Wrap `queue`.
    pub fn new(queue: Arc<FocusEventQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue `event`. Returns false if the queue is shut down.
    pub fn send(&self, event: FocusEvent) -> bool {
        self.queue.enqueue(event)
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn drain_preserves_order_without_coalescing() {
        let q = FocusEventQueue::new();
        let events = [
            FocusEvent::new(1, 2),
            FocusEvent::new(2, 1),
            FocusEvent::new(1, 2),
        ];
        for e in events {
            assert!(q.enqueue(e));
        }
        assert_eq!(q.drain_all(), events.to_vec());
        assert!(q.is_empty());
    }

    #[test]
    fn wait_returns_batch() {
        let q = FocusEventQueue::new();
        q.enqueue(FocusEvent::new(1, 2));
        q.enqueue(FocusEvent::new(2, 3));
        assert_eq!(
            q.wait(),
            Wake::Work(vec![FocusEvent::new(1, 2), FocusEvent::new(2, 3)])
        );
    }

    #[test]
    fn shutdown_wakes_waiter_and_rejects_new_events() {
        let q = Arc::new(FocusEventQueue::new());
        let waiter = {
            let q = q.clone();
            thread::spawn(move || q.wait())
        };
        thread::sleep(Duration::from_millis(20));
        q.request_shutdown();
        assert_eq!(waiter.join().unwrap(), Wake::Quit { discarded: 0 });
        assert!(!q.enqueue(FocusEvent::new(1, 2)));
        assert!(q.is_shutdown());
    }

    #[test]
    fn cross_thread_delivery() {
        let q = Arc::new(FocusEventQueue::new());
        let sender = FocusEventSender::new(q.clone());
        let producer = thread::spawn(move || {
            for i in 1..=100u32 {
                sender.send(FocusEvent::new(i, i + 1));
            }
        });
        let mut got = Vec::new();
        while got.len() < 100 {
            match q.wait() {
                Wake::Work(batch) => got.extend(batch),
                Wake::Quit { .. } => break,
            }
        }
        producer.join().unwrap();
        let want: Vec<FocusEvent> = (1..=100u32).map(|i| FocusEvent::new(i, i + 1)).collect();
        assert_eq!(got, want);
    }
}
