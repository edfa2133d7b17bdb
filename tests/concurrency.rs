//! 并发访问测试
//! Concurrent access tests

pub mod common;

use common::harness::{Counter, init_tracing};
use kestrel_scheduler::{Interval, Timer, TimerState};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fires_are_never_concurrent() {
    init_tracing();
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Counter::new();
    let fires = Counter::new();

    let (active_clone, overlaps_clone, fires_clone) = (active.clone(), overlaps.clone(), fires.clone());
    let timer = Timer::every(Interval::Milliseconds(2), None, move |_| {
        if active_clone.fetch_add(1, Ordering::SeqCst) != 0 {
            overlaps_clone.hit();
        }
        fires_clone.hit();
        std::thread::sleep(Duration::from_micros(200));
        active_clone.fetch_sub(1, Ordering::SeqCst);
    })
    .expect("runtime is available");

    let mut workers = Vec::new();
    for _ in 0..4 {
        let timer = timer.clone();
        workers.push(tokio::task::spawn_blocking(move || {
            for _ in 0..50 {
                timer.fire(false);
            }
        }));
    }
    for worker in workers {
        worker.await.expect("worker panicked");
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    timer.pause();

    assert_eq!(overlaps.get(), 0);
    assert!(fires.get() >= 200);
    assert_eq!(timer.state(), TimerState::Paused);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_lifecycle_calls_leave_consistent_state() {
    init_tracing();
    let timer = Timer::every(Interval::Milliseconds(1), None, |_| {}).expect("runtime is available");

    let mut workers = Vec::new();
    for worker in 0..4 {
        let timer = timer.clone();
        workers.push(tokio::task::spawn_blocking(move || {
            for round in 0..200 {
                match (worker + round) % 4 {
                    0 => {
                        timer.pause();
                    }
                    1 => {
                        timer.start();
                    }
                    2 => timer.reset(None, round % 2 == 0),
                    _ => timer.fire(false),
                }
            }
        }));
    }
    for worker in workers {
        worker.await.expect("worker panicked");
    }

    timer.pause();
    assert_eq!(timer.state(), TimerState::Paused);
    assert!(timer.start());
    assert_eq!(timer.state(), TimerState::Running);
}
