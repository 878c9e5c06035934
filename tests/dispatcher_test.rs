//! Integration tests for the thread dispatcher and the config builder.
//!
//! These tests validate the scheduler adapter contract:
//! - Primary context serialization and submission ordering
//! - Background contexts executing independently per priority
//! - Wall-clock delays on submit_after
//! - Config-driven construction
//! - Graceful shutdown semantics

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;

use taskchain::builders::build_dispatcher;
use taskchain::config::DispatcherConfig;
use taskchain::runtime::{Dispatch, ExecContext, Priority, ThreadDispatcher};

const WAIT: Duration = Duration::from_secs(2);

fn small_config() -> DispatcherConfig {
    DispatcherConfig::new()
        .with_high_workers(2)
        .with_normal_workers(2)
        .with_low_workers(1)
        .with_thread_stack_size(512 * 1024)
}

#[test]
fn test_primary_context_is_serialized_in_submission_order() {
    let dispatcher = ThreadDispatcher::new(&small_config()).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let (done, done_rx) = unbounded();

    for i in 0..200_usize {
        let order = Arc::clone(&order);
        let in_flight = Arc::clone(&in_flight);
        let overlaps = Arc::clone(&overlaps);
        let done = done.clone();
        dispatcher.submit(
            Box::new(move || {
                if in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                order.lock().unwrap().push(i);
                in_flight.fetch_sub(1, Ordering::SeqCst);
                if i == 199 {
                    done.send(()).unwrap();
                }
            }),
            ExecContext::Primary,
        );
    }

    done_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(*order.lock().unwrap(), (0..200).collect::<Vec<_>>());
    dispatcher.shutdown();
}

#[test]
fn test_background_priorities_all_execute() {
    let dispatcher = ThreadDispatcher::new(&small_config()).unwrap();
    let (done, done_rx) = unbounded();

    for priority in [Priority::High, Priority::Normal, Priority::Low] {
        let done = done.clone();
        dispatcher.submit(
            Box::new(move || {
                done.send(priority).unwrap();
            }),
            ExecContext::Background(priority),
        );
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(done_rx.recv_timeout(WAIT).unwrap());
    }
    for priority in [Priority::High, Priority::Normal, Priority::Low] {
        assert!(seen.contains(&priority), "{priority:?} never ran");
    }
    assert_eq!(dispatcher.stats().submitted_jobs, 3);
    dispatcher.shutdown();
}

#[test]
fn test_submit_after_waits_at_least_the_delay() {
    let dispatcher = ThreadDispatcher::new(&small_config()).unwrap();
    let (done, done_rx) = unbounded();
    let start = Instant::now();

    dispatcher.submit_after(
        Box::new(move || {
            done.send(start.elapsed()).unwrap();
        }),
        Duration::from_millis(200),
        ExecContext::Background(Priority::Normal),
    );

    let elapsed = done_rx.recv_timeout(WAIT).unwrap();
    assert!(elapsed >= Duration::from_millis(200), "ran after {elapsed:?}");
    assert!(
        elapsed < Duration::from_millis(600),
        "delay overshot tolerance: {elapsed:?}"
    );
    dispatcher.shutdown();
}

#[test]
fn test_build_dispatcher_from_json_config() {
    let cfg = DispatcherConfig::from_json_str(
        r#"{
            "backend": "threads",
            "high_workers": 1,
            "normal_workers": 2,
            "low_workers": 1,
            "thread_stack_size": 1048576
        }"#,
    )
    .unwrap();
    let dispatcher = build_dispatcher(&cfg).unwrap();
    let (done, done_rx) = unbounded();

    dispatcher.submit(
        Box::new(move || {
            done.send(7).unwrap();
        }),
        ExecContext::Background(Priority::Low),
    );

    assert_eq!(done_rx.recv_timeout(WAIT).unwrap(), 7);
}

#[test]
fn test_queued_jobs_drain_on_shutdown() {
    let dispatcher = ThreadDispatcher::new(&small_config()).unwrap();
    let executed = Arc::new(AtomicUsize::new(0));

    for _ in 0..50 {
        let executed = Arc::clone(&executed);
        dispatcher.submit(
            Box::new(move || {
                executed.fetch_add(1, Ordering::SeqCst);
            }),
            ExecContext::Primary,
        );
    }
    dispatcher.shutdown();

    assert_eq!(executed.load(Ordering::SeqCst), 50);
    dispatcher.submit(Box::new(|| panic!("must not run")), ExecContext::Primary);
    assert_eq!(dispatcher.stats().dropped_jobs, 1);
}
