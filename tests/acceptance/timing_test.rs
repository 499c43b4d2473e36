//! Debounce, retrigger and expiry timing.

use super::common::{two_clusters, wait_until, BASE_MIN};
use boost_common::state::BoostPhase;
use boost_core::input_filter::{InputEvent, TriggerOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_events_inside_window_are_debounced() {
    let h = two_clusters("1000000", 500);
    assert!(matches!(
        h.boost.handle_input(&InputEvent::touch_down(0)),
        TriggerOutcome::Boosted { .. }
    ));
    for id in 1..10 {
        assert_eq!(
            h.boost.handle_input(&InputEvent::touch_down(id)),
            TriggerOutcome::Debounced
        );
    }
    let stats = h.boost.stats();
    assert_eq!(stats.generation, 1);
    assert_eq!(stats.triggers_accepted, 1);
    assert_eq!(stats.triggers_debounced, 9);
    assert_eq!(stats.expiries_armed, 1);
}

#[test]
fn test_event_after_window_starts_new_cycle() {
    let h = two_clusters("1000000", 60);
    h.boost.handle_input(&InputEvent::touch_down(0));
    assert!(wait_until(|| h.boost.stats().expiries_fired == 1));
    assert!(matches!(
        h.boost.handle_input(&InputEvent::touch_down(0)),
        TriggerOutcome::Boosted { generation: 2, .. }
    ));
    assert!(wait_until(|| h.boost.stats().expiries_fired == 2));
}

#[test]
fn test_retrigger_while_active_extends_deadline() {
    let h = two_clusters("1000000", 5_000);
    let first = Instant::now();
    h.boost.handle_input(&InputEvent::touch_down(0));
    assert!(wait_until(|| h.boost.active_floor(0) == 1_000_000));

    // Shorten the window so the next event passes the debounce while the
    // first deadline is still seconds away.
    h.boost.set_window_ms(60).unwrap();
    thread::sleep(Duration::from_millis(80));
    assert!(matches!(
        h.boost.handle_input(&InputEvent::touch_down(1)),
        TriggerOutcome::Boosted { generation: 2, .. }
    ));
    assert_eq!(h.boost.active_floor(0), 1_000_000);
    assert_eq!(h.boost.phase(), BoostPhase::Active);

    assert!(wait_until(|| h.boost.phase() == BoostPhase::Idle));
    assert!(first.elapsed() < Duration::from_secs(4));
    let stats = h.boost.stats();
    assert_eq!(stats.expiries_fired, 1);
    assert_eq!(stats.expiries_stale, 0);
    assert_eq!(h.governor.policy_min(0), Some(BASE_MIN));
}

#[test]
fn test_expiry_waits_for_window() {
    let h = two_clusters("1000000", 250);
    let start = Instant::now();
    h.boost.handle_input(&InputEvent::touch_down(0));
    assert!(wait_until(|| h.boost.phase() == BoostPhase::Idle));
    assert!(start.elapsed() >= Duration::from_millis(250));
}

#[test]
fn test_concurrent_input_single_cycle() {
    let h = Arc::new(two_clusters("1000000", 2_000));
    let boosted = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let h = Arc::clone(&h);
            let boosted = Arc::clone(&boosted);
            thread::spawn(move || {
                for i in 0..200 {
                    if let TriggerOutcome::Boosted { .. } =
                        h.boost.handle_input(&InputEvent::touch_down(t * 1000 + i))
                    {
                        boosted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(boosted.load(Ordering::Relaxed), 1);
    let stats = h.boost.stats();
    assert_eq!(stats.generation, 1);
    assert_eq!(stats.triggers_debounced, 1599);
    assert!(wait_until(|| h.boost.active_floor(3) == 1_000_000));
}

#[test]
fn test_wake_latency_recorded() {
    let h = two_clusters("1000000", 300);
    h.boost.handle_input(&InputEvent::touch_down(0));
    assert!(wait_until(|| h
        .boost
        .stats()
        .wake_latency
        .iter()
        .flatten()
        .all(|l| l.total == 1)));
}
