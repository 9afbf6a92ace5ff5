//! Worker startup handshake and coordinated teardown.
//!
//! The worker thread acquires the audio capability, starts the session
//! tracker, and reports readiness over a one-shot channel. It then waits for
//! the orchestrator to confirm that the focus hook is live before it starts
//! draining the event queue. Dropping the confirmation channel instead tells
//! the worker to tear down without ever entering the event loop.
//!
//! ```text
//! Starting -> Ready -> Running -> Draining -> Stopped
//!               \__________________^
//! ```

use std::{
    fmt,
    result::Result as StdResult,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::{debug, error, info, warn};

use crate::{
    capability::AudioSessions,
    coordinator::MuteCoordinator,
    error::{CapabilityError, Error, Result, TrackerStep},
    queue::{FocusEventQueue, FocusEventSender, Wake},
    registry::SessionRegistry,
    tracker::SessionTracker,
};

/// Name given to the worker thread.
pub const WORKER_THREAD_NAME: &str = "focusmute-worker";

/// Phase of the program run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// The worker is acquiring the capability and enumerating sessions.
    Starting,
    /// Tracking is live; the focus hook is not yet installed.
    Ready,
    /// The focus hook is installed and switches are being applied.
    Running,
    /// Shutdown was requested; the worker is finishing up.
    Draining,
    /// The worker has been joined.
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Timing and teardown options for [`Lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Bound on the wait for the worker to report readiness.
    pub ready_timeout: Duration,
    /// Bound on the wait for the worker to exit at shutdown. `None` waits
    /// indefinitely.
    pub join_timeout: Option<Duration>,
    /// Unmute sessions this program muted before the worker exits.
    pub restore_on_exit: bool,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(20),
            join_timeout: None,
            restore_on_exit: true,
        }
    }
}

/// Owns the worker thread and the state shared with it.
pub struct Lifecycle {
    /// Current phase, as seen by the orchestrator.
    state: LifecycleState,
    /// Registry shared with the worker's tracker and coordinator.
    registry: Arc<SessionRegistry>,
    /// Queue the detection context feeds.
    queue: Arc<FocusEventQueue>,
    /// Confirmation channel; dropped to abandon startup.
    go: Option<Sender<()>>,
    /// Disconnected when the worker thread exits.
    done: Receiver<()>,
    /// Worker thread handle, taken when joined.
    worker: Option<JoinHandle<()>>,
    /// Settings captured at start.
    settings: LifecycleSettings,
}

impl Lifecycle {
    /// Spawn the worker and wait, bounded by `settings.ready_timeout`, for it
    /// to report that session tracking is live.
    ///
    /// `factory` runs on the worker thread, so the capability it builds is
    /// acquired, used, and released there and never crosses threads.
    pub fn start<F, C>(factory: F, settings: LifecycleSettings) -> Result<Self>
    where
        F: FnOnce() -> StdResult<C, CapabilityError> + Send + 'static,
        C: AudioSessions + 'static,
    {
        debug!(state = %LifecycleState::Starting, "lifecycle");
        let registry = Arc::new(SessionRegistry::new());
        let queue = Arc::new(FocusEventQueue::new());
        let (ready_tx, ready_rx) = bounded::<Result<usize>>(1);
        let (go_tx, go_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let worker = Worker {
            registry: registry.clone(),
            queue: queue.clone(),
            ready: ready_tx,
            go: go_rx,
            restore_on_exit: settings.restore_on_exit,
        };
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || {
                let _done = done_tx;
                worker.run(factory);
            })
            .map_err(Error::Spawn)?;

        match ready_rx.recv_timeout(settings.ready_timeout) {
            Ok(Ok(sessions)) => {
                info!(sessions, state = %LifecycleState::Ready, "lifecycle");
                Ok(Self {
                    state: LifecycleState::Ready,
                    registry,
                    queue,
                    go: Some(go_tx),
                    done: done_rx,
                    worker: Some(handle),
                    settings,
                })
            }
            Ok(Err(e)) => {
                error!(error = %e, "worker_start_failed");
                let _ = handle.join();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                error!(timeout = ?settings.ready_timeout, "worker_ready_timeout");
                // The worker is detached. If it ever becomes ready it finds
                // the confirmation channel closed and tears itself down.
                queue.request_shutdown();
                Err(Error::ReadyTimeout(settings.ready_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => match handle.join() {
                Ok(()) => Err(Error::WorkerExited),
                Err(_) => Err(Error::WorkerPanicked),
            },
        }
    }

    /// Current phase.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The queue shared with the worker.
    pub fn queue(&self) -> &Arc<FocusEventQueue> {
        &self.queue
    }

    /// An enqueue-only handle for the detection context.
    pub fn sender(&self) -> FocusEventSender {
        FocusEventSender::new(self.queue.clone())
    }

    /// The registry shared with the worker.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Tell the worker the focus hook is installed and it may start applying
    /// switches.
    pub fn confirm_running(&mut self) -> Result<()> {
        if self.state != LifecycleState::Ready {
            return Err(Error::InvalidState {
                from: self.state,
                to: LifecycleState::Running,
            });
        }
        let Some(go) = &self.go else {
            return Err(Error::WorkerExited);
        };
        go.send(()).map_err(|_| Error::WorkerExited)?;
        self.state = LifecycleState::Running;
        info!(state = %self.state, "lifecycle");
        Ok(())
    }

    /// Raise the quit signal and join the worker. Queued switches not yet
    /// drained are discarded; a batch in progress completes. Idempotent once
    /// stopped.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == LifecycleState::Stopped {
            return Ok(());
        }
        self.state = LifecycleState::Draining;
        info!(state = %self.state, "lifecycle");
        self.queue.request_shutdown();
        self.go = None;

        if let Some(limit) = self.settings.join_timeout
            && let Err(RecvTimeoutError::Timeout) = self.done.recv_timeout(limit)
        {
            warn!(timeout = ?limit, "worker_join_timeout");
            return Err(Error::JoinTimeout(limit));
        }
        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            self.state = LifecycleState::Stopped;
            return Err(Error::WorkerPanicked);
        }
        self.state = LifecycleState::Stopped;
        info!(state = %self.state, "lifecycle");
        Ok(())
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if self.state != LifecycleState::Stopped {
            debug!(state = %self.state, "lifecycle_dropped_without_shutdown");
            self.queue.request_shutdown();
            self.go = None;
        }
    }
}

/// Everything the worker thread owns besides the capability.
struct Worker {
    /// Shared registry.
    registry: Arc<SessionRegistry>,
    /// Shared queue.
    queue: Arc<FocusEventQueue>,
    /// One-shot readiness report.
    ready: Sender<Result<usize>>,
    /// Confirmation from the orchestrator.
    go: Receiver<()>,
    /// Unmute what we muted before exiting.
    restore_on_exit: bool,
}

impl Worker {
    /// Body of the worker thread.
    fn run<F, C>(self, factory: F)
    where
        F: FnOnce() -> StdResult<C, CapabilityError>,
        C: AudioSessions,
    {
        let caps = match factory() {
            Ok(caps) => caps,
            Err(source) => {
                warn!(code = source.code, error = %source, "capability_acquire_failed");
                let _ = self.ready.send(Err(Error::Startup {
                    step: TrackerStep::AcquireCapability,
                    source,
                }));
                return;
            }
        };

        let tracker = SessionTracker::new(self.registry.clone());
        let sessions = match tracker.start(&caps) {
            Ok(n) => n,
            Err(e) => {
                let _ = self.ready.send(Err(e));
                return;
            }
        };

        if self.ready.send(Ok(sessions)).is_err() || self.go.recv().is_err() {
            debug!("worker_not_confirmed");
            tracker.shutdown(&caps);
            return;
        }

        let mut coordinator = MuteCoordinator::new(self.registry.clone());
        loop {
            match self.queue.wait() {
                Wake::Work(batch) => {
                    coordinator.apply_batch(batch);
                    tracker.release_retired();
                }
                Wake::Quit { discarded } => {
                    debug!(discarded, "worker_quit");
                    break;
                }
            }
        }

        if self.restore_on_exit {
            coordinator.restore_all();
        }
        tracker.shutdown(&caps);
        drop(caps);
        debug!("worker_exited");
    }
}
