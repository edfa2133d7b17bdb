//! 定时器状态机测试
//! Timer state machine tests

use super::*;
use crate::error::Error;
use crate::interval::Interval;
use crate::testing::{RecordingBackend, SourceOp};
use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;

fn finite(count: u32) -> TimerMode {
    TimerMode::Finite(NonZeroU32::new(count).unwrap())
}

fn recording_timer(mode: TimerMode, backend: &RecordingBackend) -> (Timer, Arc<AtomicUsize>) {
    let fires = Arc::new(AtomicUsize::new(0));
    let fires_clone = fires.clone();
    let timer = Timer::builder(Interval::Milliseconds(10))
        .mode(mode)
        .backend(Arc::new(backend.clone()))
        .build(move |_| {
            fires_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    (timer, fires)
}

#[test]
fn new_timer_is_paused_and_armed() {
    let backend = RecordingBackend::new();
    let (timer, fires) = recording_timer(TimerMode::Infinite, &backend);

    assert_eq!(timer.state(), TimerState::Paused);
    assert_eq!(timer.suspension_count(), 1);
    assert_eq!(timer.observer_count(), 1);
    assert_eq!(fires.load(Ordering::SeqCst), 0);
    assert_eq!(
        backend.latest().ops(),
        vec![
            SourceOp::Schedule {
                repeat: Some(Duration::from_millis(10))
            },
            SourceOp::Activate,
        ]
    );
}

#[test]
fn once_timer_finishes_after_single_fire() {
    let backend = RecordingBackend::new();
    let (timer, fires) = recording_timer(TimerMode::Once, &backend);
    assert_eq!(
        backend.latest().ops()[0],
        SourceOp::Schedule { repeat: None }
    );

    assert!(timer.start());
    backend.latest().fire();

    assert_eq!(fires.load(Ordering::SeqCst), 1);
    assert!(timer.state().is_finished());
    assert_eq!(timer.suspension_count(), 1);

    backend.latest().fire();
    assert_eq!(fires.load(Ordering::SeqCst), 1);
}

#[test]
fn finite_timer_counts_down_then_finishes() {
    let backend = RecordingBackend::new();
    let (timer, fires) = recording_timer(finite(3), &backend);
    assert_eq!(timer.remaining_iterations(), Some(3));

    timer.start();
    for expected in [2, 1] {
        backend.latest().fire();
        assert_eq!(timer.remaining_iterations(), Some(expected));
        assert_eq!(timer.state(), TimerState::Running);
    }
    backend.latest().fire();
    assert_eq!(timer.remaining_iterations(), Some(0));
    assert_eq!(timer.state(), TimerState::Finished);

    backend.latest().fire();
    assert_eq!(fires.load(Ordering::SeqCst), 3);
    assert_eq!(timer.remaining_iterations(), Some(0));
}

#[test]
fn infinite_timer_has_no_iteration_count() {
    let backend = RecordingBackend::new();
    let (timer, fires) = recording_timer(TimerMode::Infinite, &backend);
    timer.start();
    for _ in 0..5 {
        backend.latest().fire();
    }
    assert_eq!(fires.load(Ordering::SeqCst), 5);
    assert_eq!(timer.remaining_iterations(), None);
    assert_eq!(timer.state(), TimerState::Running);
}

#[test]
fn reset_restores_iterations_and_replaces_handle() {
    let backend = RecordingBackend::new();
    let (timer, fires) = recording_timer(finite(3), &backend);
    timer.start();
    backend.latest().fire();
    backend.latest().fire();
    assert_eq!(timer.remaining_iterations(), Some(1));

    timer.reset(None, true);

    assert_eq!(timer.remaining_iterations(), Some(3));
    assert_eq!(timer.state(), TimerState::Running);
    assert_eq!(timer.suspension_count(), 0);
    assert_eq!(backend.source_count(), 2);
    assert_eq!(
        backend.source(0).ops(),
        vec![
            SourceOp::Schedule {
                repeat: Some(Duration::from_millis(10))
            },
            SourceOp::Activate,
            SourceOp::Resume,
            SourceOp::Suspend,
            SourceOp::Resume,
            SourceOp::Cancel,
        ]
    );

    // Late fire from the replaced source is discarded.
    backend.source(0).fire();
    assert_eq!(fires.load(Ordering::SeqCst), 2);
    assert_eq!(timer.remaining_iterations(), Some(3));
}

#[test]
fn reset_without_restart_leaves_timer_paused() {
    let backend = RecordingBackend::new();
    let (timer, _) = recording_timer(TimerMode::Infinite, &backend);
    timer.start();

    timer.reset(Some(Interval::Milliseconds(40)), false);

    assert_eq!(timer.state(), TimerState::Paused);
    assert_eq!(timer.interval(), Interval::Milliseconds(40));
    assert_eq!(timer.suspension_count(), 1);
    assert_eq!(
        backend.latest().ops(),
        vec![
            SourceOp::Schedule {
                repeat: Some(Duration::from_millis(40))
            },
            SourceOp::Activate,
        ]
    );
}

#[test]
fn suspension_count_stays_balanced() {
    let backend = RecordingBackend::new();
    let (timer, _) = recording_timer(finite(2), &backend);

    let check = |timer: &Timer| {
        let count = timer.suspension_count();
        assert!(count <= 1);
        match timer.state() {
            TimerState::Running => assert_eq!(count, 0),
            TimerState::Paused | TimerState::Finished => assert_eq!(count, 1),
            TimerState::Executing => unreachable!(),
        }
    };

    check(&timer);
    timer.start();
    check(&timer);
    timer.start();
    check(&timer);
    timer.pause();
    check(&timer);
    timer.pause();
    check(&timer);
    timer.reset(None, false);
    check(&timer);
    timer.reset(None, true);
    check(&timer);
    timer.reset(None, true);
    check(&timer);
    backend.latest().fire();
    backend.latest().fire();
    check(&timer);
    timer.pause();
    check(&timer);
    timer.start();
    check(&timer);
}

#[test]
fn start_and_pause_report_transitions() {
    let backend = RecordingBackend::new();
    let (timer, _) = recording_timer(TimerMode::Infinite, &backend);

    assert!(!timer.pause());
    assert!(timer.start());
    assert!(!timer.start());
    assert!(timer.pause());
    assert!(!timer.pause());
}

#[test]
fn starting_finished_timer_resets_it() {
    let backend = RecordingBackend::new();
    let (timer, fires) = recording_timer(TimerMode::Once, &backend);
    timer.start();
    backend.latest().fire();
    assert!(timer.state().is_finished());
    assert!(!timer.pause());

    assert!(timer.start());

    assert_eq!(timer.state(), TimerState::Running);
    assert_eq!(backend.source_count(), 2);
    backend.latest().fire();
    assert_eq!(fires.load(Ordering::SeqCst), 2);
    assert!(timer.state().is_finished());
}

#[test]
fn manual_fire_keeps_paused_timer_paused() {
    let backend = RecordingBackend::new();
    let (timer, fires) = recording_timer(TimerMode::Infinite, &backend);

    timer.fire(false);

    assert_eq!(fires.load(Ordering::SeqCst), 1);
    assert_eq!(timer.state(), TimerState::Paused);
    assert_eq!(timer.suspension_count(), 1);
}

#[test]
fn manual_fire_can_pause_afterwards() {
    let backend = RecordingBackend::new();
    let (timer, fires) = recording_timer(finite(5), &backend);
    timer.start();

    timer.fire(true);

    assert_eq!(fires.load(Ordering::SeqCst), 1);
    assert_eq!(timer.remaining_iterations(), Some(4));
    assert_eq!(timer.state(), TimerState::Paused);
    assert_eq!(timer.suspension_count(), 1);
}

#[test]
fn manual_fire_on_finished_timer_is_ignored() {
    let backend = RecordingBackend::new();
    let (timer, fires) = recording_timer(TimerMode::Once, &backend);
    timer.fire(false);
    assert!(timer.state().is_finished());

    timer.fire(false);
    assert_eq!(fires.load(Ordering::SeqCst), 1);
}

#[test]
fn backend_fire_while_paused_is_ignored() {
    let backend = RecordingBackend::new();
    let (timer, fires) = recording_timer(TimerMode::Infinite, &backend);
    backend.latest().fire();
    timer.start();
    timer.pause();
    backend.latest().fire();
    assert_eq!(fires.load(Ordering::SeqCst), 0);
}

#[test]
fn observers_are_added_and_removed() {
    let backend = RecordingBackend::new();
    let (timer, fires) = recording_timer(TimerMode::Infinite, &backend);
    let extra = Arc::new(AtomicUsize::new(0));
    let extra_clone = extra.clone();

    let token = timer.observe(move |_| {
        extra_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(token, 2);
    assert_eq!(timer.observer_count(), 2);

    timer.start();
    backend.latest().fire();
    assert_eq!(fires.load(Ordering::SeqCst), 1);
    assert_eq!(extra.load(Ordering::SeqCst), 1);

    assert!(timer.remove(token));
    assert!(!timer.remove(token));
    backend.latest().fire();
    assert_eq!(fires.load(Ordering::SeqCst), 2);
    assert_eq!(extra.load(Ordering::SeqCst), 1);

    timer.remove_all_observers(true);
    assert_eq!(timer.observer_count(), 0);
    assert_eq!(timer.state(), TimerState::Paused);
}

#[test]
fn observers_run_in_token_order() {
    let backend = RecordingBackend::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let first = order.clone();
    let timer = Timer::builder(Interval::Milliseconds(10))
        .backend(Arc::new(backend.clone()))
        .build(move |_| first.lock().push(1))
        .unwrap();
    for tag in [2, 3] {
        let order = order.clone();
        timer.observe(move |_| order.lock().push(tag));
    }

    timer.fire(false);
    assert_eq!(*order.lock(), vec![1, 2, 3]);
}

#[test]
fn observer_token_wraps_to_zero() {
    let backend = RecordingBackend::new();
    let (timer, _) = recording_timer(TimerMode::Infinite, &backend);
    timer.set_next_observer_id(u64::MAX);

    assert_eq!(timer.observe(|_| {}), 0);
    assert_eq!(timer.observe(|_| {}), 1);
}

#[test]
fn state_hook_sees_every_assignment() {
    let backend = RecordingBackend::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let timer = Timer::builder(Interval::Milliseconds(10))
        .mode(TimerMode::Once)
        .backend(Arc::new(backend.clone()))
        .on_state_change(move |timer, state| {
            // The hook may read the timer it observes.
            assert_eq!(timer.state(), state);
            seen_clone.lock().push(state);
        })
        .build(|_| {})
        .unwrap();

    timer.start();
    backend.latest().fire();

    assert_eq!(
        *seen.lock(),
        vec![
            TimerState::Running,
            TimerState::Executing,
            TimerState::Finished
        ]
    );
}

#[test]
fn observers_can_introspect_during_fire() {
    let backend = RecordingBackend::new();
    let seen = Arc::new(Mutex::new(None));
    let seen_clone = seen.clone();
    let timer = Timer::builder(Interval::Milliseconds(10))
        .mode(finite(2))
        .backend(Arc::new(backend.clone()))
        .build(move |timer| {
            *seen_clone.lock() = Some((timer.state(), timer.remaining_iterations()));
        })
        .unwrap();

    timer.start();
    backend.latest().fire();
    assert_eq!(*seen.lock(), Some((TimerState::Executing, Some(1))));
}

#[test]
fn observer_reset_during_fire_wins_over_finish() {
    let backend = RecordingBackend::new();
    let resets = Arc::new(AtomicUsize::new(0));
    let resets_clone = resets.clone();
    let timer = Timer::builder(Interval::Milliseconds(10))
        .mode(TimerMode::Once)
        .backend(Arc::new(backend.clone()))
        .build(move |timer| {
            if resets_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                timer.reset(None, true);
            }
        })
        .unwrap();

    timer.start();
    backend.latest().fire();
    assert_eq!(timer.state(), TimerState::Running);
    assert_eq!(backend.source_count(), 2);

    backend.latest().fire();
    assert!(timer.state().is_finished());
    assert_eq!(resets.load(Ordering::SeqCst), 2);
}

#[test]
fn observer_pause_during_last_fire_still_finishes() {
    let backend = RecordingBackend::new();
    let timer = Timer::builder(Interval::Milliseconds(10))
        .mode(finite(1))
        .backend(Arc::new(backend.clone()))
        .build(|timer| {
            timer.pause();
        })
        .unwrap();

    timer.start();
    backend.latest().fire();
    assert!(timer.state().is_finished());
    assert_eq!(timer.suspension_count(), 1);
}

#[test]
fn dropping_last_clone_releases_handle() {
    let backend = RecordingBackend::new();
    let (timer, _) = recording_timer(TimerMode::Infinite, &backend);
    let clone = timer.clone();
    drop(timer);
    assert!(!backend.latest().is_cancelled());

    drop(clone);
    assert_eq!(
        &backend.latest().ops()[2..],
        &[SourceOp::Resume, SourceOp::Cancel]
    );
}

#[test]
fn building_outside_runtime_without_handle_fails() {
    let result = Timer::new(Interval::Seconds(1.0), TimerMode::Infinite, |_| {});
    assert!(matches!(result, Err(Error::NoRuntime(_))));
}

#[test]
fn builder_accepts_explicit_runtime_handle() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let timer = Timer::builder(Duration::from_millis(10))
        .tolerance(Duration::from_millis(2))
        .runtime(runtime.handle().clone())
        .build(|_| {})
        .unwrap();
    assert_eq!(timer.tolerance(), Duration::from_millis(2));
    assert_eq!(timer.mode(), TimerMode::Infinite);
}

#[tokio::test(start_paused = true)]
async fn every_with_count_fires_exactly_that_many_times() {
    let fires = Arc::new(AtomicUsize::new(0));
    let fires_clone = fires.clone();
    let timer = Timer::every(Interval::Seconds(0.1), NonZeroU32::new(3), move |_| {
        fires_clone.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    assert_eq!(timer.state(), TimerState::Running);

    sleep(Duration::from_millis(350)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 3);
    assert_eq!(timer.state(), TimerState::Finished);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn once_fires_after_delay() {
    let fires = Arc::new(AtomicUsize::new(0));
    let fires_clone = fires.clone();
    let timer = Timer::once(Interval::Milliseconds(100), move |_| {
        fires_clone.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    sleep(Duration::from_millis(50)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 0);

    sleep(Duration::from_millis(100)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 1);
    assert!(timer.state().is_finished());
}

#[tokio::test(start_paused = true)]
async fn paused_timer_does_not_fire_until_started() {
    let fires = Arc::new(AtomicUsize::new(0));
    let fires_clone = fires.clone();
    let timer = Timer::every(Interval::Milliseconds(100), None, move |_| {
        fires_clone.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    sleep(Duration::from_millis(150)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 1);

    timer.pause();
    sleep(Duration::from_millis(400)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 1);

    // Missed periods coalesce into a single fire on resume.
    timer.start();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_timer_stops_firing() {
    let fires = Arc::new(AtomicUsize::new(0));
    let fires_clone = fires.clone();
    let timer = Timer::every(Interval::Milliseconds(100), None, move |_| {
        fires_clone.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    sleep(Duration::from_millis(150)).await;
    drop(timer);
    sleep(Duration::from_millis(400)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn huge_interval_saturates_instead_of_panicking() {
    let fires = Arc::new(AtomicUsize::new(0));
    let fires_clone = fires.clone();
    let timer = Timer::every(Interval::Days(u64::MAX), None, move |_| {
        fires_clone.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    assert_eq!(timer.state(), TimerState::Running);

    sleep(Duration::from_secs(3_600)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 0);

    timer.reset(Some(Interval::Milliseconds(10)), true);
    sleep(Duration::from_millis(15)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 1);
}
