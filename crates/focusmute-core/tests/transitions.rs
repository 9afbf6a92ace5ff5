use std::sync::Arc;

use focusmute_core::{
    FocusEvent, FocusEventQueue, MuteCoordinator, Outcome, SessionOwner, SessionRegistry,
    SessionTracker, SkipReason,
    test_support::{MockAudioSessions, MockSession},
};
use proptest::prelude::*;

fn coordinator(mock: &MockAudioSessions) -> MuteCoordinator {
    let registry = Arc::new(SessionRegistry::new());
    SessionTracker::new(registry.clone()).start(mock).unwrap();
    MuteCoordinator::new(registry)
}

#[test]
fn same_process_transition_is_a_noop() {
    let mock = MockAudioSessions::new();
    let a = mock.add_for_pid(4, "a");
    let mut c = coordinator(&mock);
    let out = c.apply_transition(FocusEvent::new(4, 4));
    assert!(matches!(out, Outcome::Skipped(SkipReason::SameProcess)));
    assert_eq!(a.mute_calls(), 0);
}

#[test]
fn null_process_transition_is_rejected() {
    let mock = MockAudioSessions::new();
    let a = mock.add_for_pid(4, "a");
    let mut c = coordinator(&mock);
    assert!(matches!(
        c.apply_transition(FocusEvent::new(0, 4)),
        Outcome::Skipped(SkipReason::NullProcess)
    ));
    assert!(matches!(
        c.apply_transition(FocusEvent::new(4, 0)),
        Outcome::Skipped(SkipReason::NullProcess)
    ));
    assert_eq!(a.mute_calls(), 0);
}

#[test]
fn mutes_old_unmutes_new_and_leaves_others() {
    let mock = MockAudioSessions::new();
    let a: Vec<MockSession> = (0..3).map(|i| mock.add_for_pid(1, &format!("a{i}"))).collect();
    let b: Vec<MockSession> = (0..2).map(|i| mock.add_for_pid(2, &format!("b{i}"))).collect();
    let other = mock.add_for_pid(3, "o");
    for s in &b {
        s.preset_muted(true);
    }
    let mut c = coordinator(&mock);

    let Outcome::Applied(report) = c.apply_transition(FocusEvent::new(1, 2)) else {
        panic!("transition skipped");
    };
    assert_eq!(report.muted, 3);
    assert_eq!(report.unmuted, 2);
    assert!(report.is_clean());
    assert!(a.iter().all(MockSession::is_muted));
    assert!(b.iter().all(|s| !s.is_muted()));
    assert_eq!(other.mute_calls(), 0);
}

#[test]
fn shared_sessions_are_never_touched() {
    let mock = MockAudioSessions::new();
    let shared = mock.add_session(SessionOwner::Shared, "system", "sys");
    let a = mock.add_for_pid(1, "a");
    let mut c = coordinator(&mock);
    c.apply_transition(FocusEvent::new(1, 2));
    c.apply_transition(FocusEvent::new(2, 1));
    assert!(!a.is_muted());
    assert_eq!(a.mute_calls(), 2);
    assert_eq!(shared.mute_calls(), 0);
}

#[test]
fn process_without_sessions_gets_zero_unmute_calls() {
    let mock = MockAudioSessions::new();
    let s1 = mock.add_for_pid(1, "s1");
    let mut c = coordinator(&mock);
    let Outcome::Applied(report) = c.apply_transition(FocusEvent::new(1, 2)) else {
        panic!("transition skipped");
    };
    assert!(s1.is_muted());
    assert_eq!(report.muted, 1);
    assert_eq!(report.unmuted, 0);
    assert!(report.is_clean());
}

#[test]
fn one_failing_session_does_not_stop_the_batch() {
    let mock = MockAudioSessions::new();
    let old: Vec<MockSession> = (0..3).map(|i| mock.add_for_pid(1, &format!("o{i}"))).collect();
    let new: Vec<MockSession> = (0..2).map(|i| mock.add_for_pid(2, &format!("n{i}"))).collect();
    for s in &new {
        s.preset_muted(true);
    }
    old[1].fail_mute(true);
    let mut c = coordinator(&mock);

    let Outcome::Applied(report) = c.apply_transition(FocusEvent::new(1, 2)) else {
        panic!("transition skipped");
    };
    assert_eq!(report.failed.len(), 1);
    assert_eq!(&report.failed[0].0, old[1].identity());
    assert_eq!(report.muted, 2);
    assert_eq!(report.unmuted, 2);
    assert!(old[0].is_muted());
    assert!(!old[1].is_muted());
    assert!(old[2].is_muted());
    assert!(new.iter().all(|s| !s.is_muted()));
}

#[test]
fn drained_batch_applies_in_enqueue_order() {
    let mock = MockAudioSessions::new();
    let p1 = mock.add_for_pid(11, "p1");
    let p2 = mock.add_for_pid(12, "p2");
    let p3 = mock.add_for_pid(13, "p3");
    p3.preset_muted(true);
    let mut c = coordinator(&mock);

    let q = FocusEventQueue::new();
    q.enqueue(FocusEvent::new(0, 11));
    q.enqueue(FocusEvent::new(11, 12));
    q.enqueue(FocusEvent::new(12, 13));
    let batch = q.drain_all();
    assert_eq!(batch.len(), 3);
    c.apply_batch(batch);

    assert!(p1.is_muted());
    assert!(p2.is_muted());
    assert!(!p3.is_muted());
    // p2 was unmuted by the second event, then muted by the third.
    assert_eq!(p2.mute_calls(), 2);
}

proptest! {
    #[test]
    fn transition_touches_only_the_two_processes(
        owners in proptest::collection::vec(0u32..5, 1..16),
        old in 1u32..5,
        new in 1u32..5,
    ) {
        prop_assume!(old != new);
        let mock = MockAudioSessions::new();
        let sessions: Vec<(u32, MockSession)> = owners
            .iter()
            .enumerate()
            .map(|(i, pid)| {
                let owner = if *pid == 0 { SessionOwner::Shared } else { SessionOwner::Process(*pid) };
                (*pid, mock.add_session(owner, "app", &i.to_string()))
            })
            .collect();
        let mut c = coordinator(&mock);
        c.apply_transition(FocusEvent::new(old, new));
        for (pid, s) in &sessions {
            if *pid == old {
                prop_assert!(s.is_muted());
            } else if *pid == new {
                prop_assert!(!s.is_muted());
                prop_assert_eq!(s.mute_calls(), 1);
            } else {
                prop_assert_eq!(s.mute_calls(), 0);
            }
        }
    }
}
