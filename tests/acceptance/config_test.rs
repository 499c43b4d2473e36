//! Configuration updates on a running engine.

use super::common::{two_clusters, wait_until};
use boost_common::config::BoostConfig;
use boost_core::input_filter::{InputEvent, TriggerOutcome};
use boost_core::params::Param;
use std::time::Duration;

#[test]
fn test_window_round_trip() {
    let h = two_clusters("0", 200);
    assert_eq!(h.boost.window_ms(), 200);
    h.boost.set_window_ms(120).unwrap();
    assert_eq!(h.boost.window_ms(), 120);
    assert!(h.boost.set_window_ms(49).is_err());
    assert_eq!(h.boost.window_ms(), 120);
    h.boost.set_window_ms(50).unwrap();
    assert_eq!(h.boost.get_param(Param::InputBoostMs), "50\n");
}

#[test]
fn test_enable_at_runtime() {
    let h = two_clusters("0", 200);
    assert_eq!(h.boost.handle_input(&InputEvent::touch_down(0)), TriggerOutcome::Disabled);

    h.boost.set_param(Param::InputBoostFreq, "2:900000").unwrap();
    assert!(matches!(
        h.boost.handle_input(&InputEvent::touch_down(0)),
        TriggerOutcome::Boosted { woken: 1, .. }
    ));
    assert!(wait_until(|| h.boost.active_floor(3) == 900_000));
    assert_eq!(h.boost.configured_freq(2), 900_000);
    assert_eq!(h.boost.configured_freq(0), 0);
}

#[test]
fn test_disable_at_runtime() {
    let h = two_clusters("1000000", 60);
    h.boost.set_boost_freq("0").unwrap();
    assert_eq!(h.boost.handle_input(&InputEvent::touch_down(0)), TriggerOutcome::Disabled);
    assert_eq!(h.boost.boost_freq(), "0:0 1:0 2:0 3:0 \n");
}

#[test]
fn test_reconfigure_applies_all_tunables() {
    let h = two_clusters("0", 200);
    let config = BoostConfig {
        input_boost_freq: "1200000".to_string(),
        input_boost_ms: Duration::from_millis(90),
        sched_boost_on_input: true,
        ..BoostConfig::default()
    };
    h.boost.reconfigure(&config).unwrap();
    assert_eq!(h.boost.window_ms(), 90);
    assert_eq!(h.boost.get_param(Param::SchedBoostOnInput), "Y\n");
    assert_eq!(h.boost.configured_freq(3), 1_200_000);
}

#[test]
fn test_config_file_variants() {
    let toml = r#"
        input_boost_freq = "0:1300000 4:800000"
        input_boost_ms = "40ms"
    "#;
    assert!(BoostConfig::from_toml(toml).is_err());

    let json = serde_json::json!({ "input_boost_freq": "1000000", "input_boost_ms": "150ms" });
    let config: BoostConfig = serde_json::from_value(json).unwrap();
    assert_eq!(config.window_ms(), 150);
}
