//! End-to-end boost cycles.

use super::common::{harness, test_config, two_clusters, wait_until, BASE_MIN};
use boost_common::state::BoostPhase;
use boost_core::input_filter::{codes, InputEvent, TriggerOutcome};

#[test]
fn test_paired_frequencies_boost_and_reset() {
    let h = two_clusters("0:500000 2:800000", 300);

    let outcome = h.boost.handle_input(&InputEvent::touch_down(5));
    assert!(matches!(outcome, TriggerOutcome::Boosted { woken: 2, .. }));

    assert!(wait_until(|| h.governor.policy_min(0) == Some(500_000)
        && h.governor.policy_min(2) == Some(800_000)));
    for (cpu, floor) in [(0, 500_000), (1, 500_000), (2, 800_000), (3, 800_000)] {
        assert_eq!(h.boost.active_floor(cpu), floor, "CPU{cpu}");
    }
    let boosted_reevals = h.governor.total_reevaluations();
    assert!(boosted_reevals >= 2);

    assert!(wait_until(|| h.boost.phase() == BoostPhase::Idle));
    for cpu in 0..4 {
        assert_eq!(h.boost.active_floor(cpu), 0);
    }
    assert_eq!(h.governor.policy_min(0), Some(BASE_MIN));
    assert_eq!(h.governor.policy_min(2), Some(BASE_MIN));
    assert!(h.governor.total_reevaluations() >= boosted_reevals + 2);
}

#[test]
fn test_zero_frequency_never_boosts() {
    let h = two_clusters("0", 100);
    for event in [
        InputEvent::touch_down(1),
        InputEvent::key_press(codes::KEY_POWER),
    ] {
        assert_eq!(h.boost.handle_input(&event), TriggerOutcome::Disabled);
    }
    std::thread::sleep(std::time::Duration::from_millis(150));
    let stats = h.boost.stats();
    assert_eq!(stats.wakes_sent, 0);
    assert_eq!(stats.expiries_armed, 0);
    assert_eq!(stats.worker_runs, 0);
    assert_eq!(stats.triggers_disabled, 2);
    assert_eq!(h.governor.total_reevaluations(), 0);
}

#[test]
fn test_rejected_update_keeps_configuration() {
    let h = two_clusters("0:500000 2:800000", 200);
    let before = h.boost.boost_freq();
    assert!(h.boost.set_boost_freq("1:2:3").is_err());
    assert_eq!(h.boost.boost_freq(), before);
    assert_eq!(before, "0:500000 1:500000 2:800000 3:800000 \n");
}

#[test]
fn test_key_presses_trigger_but_releases_do_not() {
    let h = two_clusters("1000000", 200);
    assert_eq!(
        h.boost.handle_input(&InputEvent::key_release(codes::KEY_VOLUMEUP)),
        TriggerOutcome::Ignored
    );
    assert_eq!(h.boost.handle_input(&InputEvent::touch_up()), TriggerOutcome::Ignored);
    assert!(matches!(
        h.boost.handle_input(&InputEvent::key_press(codes::KEY_VOLUMEDOWN)),
        TriggerOutcome::Boosted { generation: 1, .. }
    ));
}

#[test]
fn test_unconfigured_cluster_untouched() {
    let h = harness(
        vec![vec![0, 1, 2, 3], vec![4, 5], vec![6, 7]],
        &test_config("4:1400000", 300),
    );
    let outcome = h.boost.handle_input(&InputEvent::touch_down(0));
    assert!(matches!(outcome, TriggerOutcome::Boosted { woken: 1, .. }));
    assert!(wait_until(|| h.boost.active_floor(5) == 1_400_000));
    assert_eq!(h.boost.active_floor(0), 0);
    assert_eq!(h.boost.active_floor(6), 0);
    assert_eq!(h.governor.policy_min(0), Some(BASE_MIN));
    assert_eq!(h.governor.reevaluations(6), 0);
}

#[test]
fn test_cluster_boosts_with_policy_owner_offline() {
    let h = two_clusters("1000000", 300);
    h.governor.set_online(2, false);

    h.boost.handle_input(&InputEvent::touch_down(0));
    assert!(wait_until(|| h.governor.policy_min(3) == Some(1_000_000)));
    assert_eq!(h.boost.active_floor(2), 1_000_000);

    assert!(wait_until(|| h.boost.phase() == BoostPhase::Idle));
    assert_eq!(h.boost.active_floor(2), 0);
    assert_eq!(h.governor.policy_min(3), Some(BASE_MIN));
}

#[test]
fn test_scheduler_boost_held_for_window() {
    let mut config = test_config("1000000", 300);
    config.sched_boost_on_input = true;
    let h = harness(vec![vec![0, 1], vec![2, 3]], &config);

    h.boost.handle_input(&InputEvent::touch_down(0));
    assert!(wait_until(|| h.sched.is_active()));
    assert!(wait_until(|| !h.sched.is_active()));
    assert_eq!(h.sched.enables(), 1);
    assert_eq!(h.sched.disables(), 1);
}

#[test]
fn test_offline_cpu_skipped() {
    let h = two_clusters("1000000", 300);
    h.governor.set_online(3, false);
    h.boost.handle_input(&InputEvent::touch_down(0));
    assert!(wait_until(|| h.boost.active_floor(2) == 1_000_000));
    assert_eq!(h.boost.active_floor(3), 0);
}
