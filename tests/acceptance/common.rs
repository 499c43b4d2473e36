//! Common utilities for acceptance tests.

#![allow(dead_code)]

use boost_common::config::{BoostConfig, RealtimeConfig};
use boost_core::platform::{FrequencyGovernor, SchedulerBoost, TopologySource};
use boost_core::simulated::{SimulatedGovernor, SimulatedSchedBoost, StaticTopology};
use boost_core::CpuBoost;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Baseline policy minimum of the simulated platform.
pub const BASE_MIN: u32 = 300_000;
/// Policy maximum of the simulated platform.
pub const MAX: u32 = 2_400_000;

/// A running engine with handles on its simulated collaborators.
pub struct Harness {
    pub boost: CpuBoost,
    pub governor: Arc<SimulatedGovernor>,
    pub sched: Arc<SimulatedSchedBoost>,
}

/// Config with real-time elevation off so tests run unprivileged.
pub fn test_config(freq: &str, window_ms: u64) -> BoostConfig {
    BoostConfig {
        input_boost_freq: freq.to_string(),
        input_boost_ms: Duration::from_millis(window_ms),
        realtime: RealtimeConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Two clusters: `{0,1}` and `{2,3}`.
pub fn two_clusters(freq: &str, window_ms: u64) -> Harness {
    harness(vec![vec![0, 1], vec![2, 3]], &test_config(freq, window_ms))
}

/// Engine over an arbitrary cluster layout.
pub fn harness(clusters: Vec<Vec<usize>>, config: &BoostConfig) -> Harness {
    let topology = StaticTopology::new(clusters);
    let governor = Arc::new(SimulatedGovernor::new(
        &topology.cluster_topology().unwrap(),
        BASE_MIN,
        MAX,
    ));
    let sched = Arc::new(SimulatedSchedBoost::default());
    let boost = CpuBoost::start(
        &topology,
        Arc::clone(&governor) as Arc<dyn FrequencyGovernor>,
        Arc::clone(&sched) as Arc<dyn SchedulerBoost>,
        config,
    )
    .unwrap();
    Harness {
        boost,
        governor,
        sched,
    }
}

/// Poll `cond` until it holds or five seconds pass.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}
