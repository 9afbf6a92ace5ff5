use std::{
    thread,
    time::{Duration, Instant},
};

use focusmute_core::{
    CapabilityError, DisconnectReason, Error, FocusEvent, Lifecycle, LifecycleSettings,
    LifecycleState, SessionEvent, TrackerStep,
    test_support::{MOCK_FAILURE, MockAudioSessions, MockStep},
};

fn settings() -> LifecycleSettings {
    LifecycleSettings {
        ready_timeout: Duration::from_secs(5),
        join_timeout: Some(Duration::from_secs(5)),
        restore_on_exit: true,
    }
}

fn start(mock: &MockAudioSessions, settings: LifecycleSettings) -> focusmute_core::Result<Lifecycle> {
    let m = mock.clone();
    Lifecycle::start(move || Ok(m), settings)
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn full_run_mutes_and_restores() {
    let mock = MockAudioSessions::new();
    let a = mock.add_for_pid(1, "a");
    let b = mock.add_for_pid(2, "b");
    let mut lc = start(&mock, settings()).unwrap();
    assert_eq!(lc.state(), LifecycleState::Ready);
    assert_eq!(lc.registry().len(), 2);

    lc.confirm_running().unwrap();
    assert_eq!(lc.state(), LifecycleState::Running);
    assert!(lc.sender().send(FocusEvent::new(1, 2)));
    assert!(wait_until(|| a.is_muted()));
    assert!(!b.is_muted());

    lc.shutdown().unwrap();
    assert_eq!(lc.state(), LifecycleState::Stopped);
    assert!(!a.is_muted());
    assert!(!mock.has_created_sink());
    assert!(lc.registry().is_empty());
    assert_eq!(a.live_controls(), 0);
    // Idempotent.
    lc.shutdown().unwrap();
}

#[test]
fn events_queued_before_confirmation_apply_in_order() {
    let mock = MockAudioSessions::new();
    let p1 = mock.add_for_pid(11, "p1");
    let p2 = mock.add_for_pid(12, "p2");
    let p3 = mock.add_for_pid(13, "p3");
    p3.preset_muted(true);
    let mut lc = start(
        &mock,
        LifecycleSettings {
            restore_on_exit: false,
            ..settings()
        },
    )
    .unwrap();

    let tx = lc.sender();
    tx.send(FocusEvent::new(0, 11));
    tx.send(FocusEvent::new(11, 12));
    tx.send(FocusEvent::new(12, 13));
    lc.confirm_running().unwrap();

    assert!(wait_until(|| lc.queue().is_empty() && p3.mute_calls() == 1));
    lc.shutdown().unwrap();
    assert!(p1.is_muted());
    assert!(p2.is_muted());
    assert!(!p3.is_muted());
}

#[test]
fn capability_acquire_failure_reports_step() {
    let err = Lifecycle::start(
        || {
            Err::<MockAudioSessions, _>(CapabilityError::new(
                "co_initialize",
                MOCK_FAILURE,
                "no apartment",
            ))
        },
        settings(),
    )
    .err()
    .unwrap();
    assert!(matches!(
        err,
        Error::Startup {
            step: TrackerStep::AcquireCapability,
            ..
        }
    ));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn tracker_failure_is_fatal_to_worker_only() {
    let mock = MockAudioSessions::new();
    let a = mock.add_for_pid(1, "a");
    mock.fail_at(MockStep::EnumerateSessions);
    let err = start(&mock, settings()).err().unwrap();
    assert_eq!(err.exit_code(), 4);
    assert!(!mock.has_created_sink());
    assert_eq!(a.live_controls(), 0);
}

#[test]
fn ready_timeout_fails_fast_and_worker_cleans_up() {
    let mock = MockAudioSessions::new();
    mock.add_for_pid(1, "a");
    let m = mock.clone();
    let started = Instant::now();
    let err = Lifecycle::start(
        move || {
            thread::sleep(Duration::from_millis(300));
            Ok(m)
        },
        LifecycleSettings {
            ready_timeout: Duration::from_millis(30),
            ..settings()
        },
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::ReadyTimeout(_)));
    assert_eq!(err.exit_code(), 6);
    assert!(started.elapsed() < Duration::from_millis(300));
    // The detached worker finds nobody waiting and unwinds its registration.
    assert!(wait_until(|| mock.unregister_created_calls() == 1));
}

#[test]
fn worker_panic_is_reported() {
    let err = Lifecycle::start(
        || -> Result<MockAudioSessions, CapabilityError> { panic!("capability exploded") },
        settings(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::WorkerPanicked));
    assert_eq!(err.exit_code(), 7);
}

#[test]
fn shutdown_from_ready_tears_down_without_running() {
    let mock = MockAudioSessions::new();
    let a = mock.add_for_pid(1, "a");
    let mut lc = start(&mock, settings()).unwrap();
    lc.shutdown().unwrap();
    assert_eq!(lc.state(), LifecycleState::Stopped);
    assert!(!mock.has_created_sink());
    assert_eq!(a.unregister_calls(), 1);
    assert_eq!(a.mute_calls(), 0);
}

#[test]
fn confirm_requires_ready() {
    let mock = MockAudioSessions::new();
    let mut lc = start(&mock, settings()).unwrap();
    lc.confirm_running().unwrap();
    assert!(matches!(
        lc.confirm_running(),
        Err(Error::InvalidState {
            from: LifecycleState::Running,
            to: LifecycleState::Running,
        })
    ));
    lc.shutdown().unwrap();
    assert!(lc.confirm_running().is_err());
}

#[test]
fn events_after_shutdown_are_refused() {
    let mock = MockAudioSessions::new();
    let mut lc = start(&mock, settings()).unwrap();
    let tx = lc.sender();
    lc.confirm_running().unwrap();
    lc.shutdown().unwrap();
    assert!(!tx.send(FocusEvent::new(1, 2)));
}

#[test]
fn disconnected_session_listener_is_released_by_worker() {
    let mock = MockAudioSessions::new();
    let a = mock.add_for_pid(1, "a");
    let b = mock.add_for_pid(2, "b");
    let mut lc = start(&mock, settings()).unwrap();
    lc.confirm_running().unwrap();

    assert!(a.fire(SessionEvent::Disconnected(DisconnectReason::DeviceRemoval)));
    assert_eq!(lc.registry().len(), 1);
    assert!(lc.sender().send(FocusEvent::new(2, 3)));
    assert!(wait_until(|| a.unregister_calls() == 1));
    assert!(wait_until(|| b.is_muted()));
    assert!(!a.has_sink());

    lc.shutdown().unwrap();
    assert_eq!(a.unregister_calls(), 1);
    assert_eq!(b.unregister_calls(), 1);
    assert_eq!(a.live_controls(), 0);
}
