//! Counters describing what the boost engine has done.
//!
//! All counters are relaxed atomics bumped from the input path, the workers
//! and the expiry task; [`BoostStats`] is a point-in-time copy.

use boost_common::metrics::LatencySnapshot;
use boost_common::state::BoostPhase;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by the engine's threads.
#[derive(Debug, Default)]
pub struct BoostCounters {
    pub(crate) triggers_accepted: AtomicU64,
    pub(crate) triggers_debounced: AtomicU64,
    pub(crate) triggers_disabled: AtomicU64,
    pub(crate) wakes_sent: AtomicU64,
    pub(crate) wakes_coalesced: AtomicU64,
    pub(crate) worker_runs: AtomicU64,
    pub(crate) stale_wakes: AtomicU64,
    pub(crate) policy_fetch_failures: AtomicU64,
    pub(crate) reevaluation_failures: AtomicU64,
    pub(crate) sched_boost_failures: AtomicU64,
    pub(crate) expiries_armed: AtomicU64,
    pub(crate) expiries_fired: AtomicU64,
    pub(crate) expiries_stale: AtomicU64,
}

impl BoostCounters {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Snapshot of engine activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoostStats {
    /// Current cycle phase.
    pub phase: BoostPhase,
    /// Latest cycle generation (number of accepted triggers).
    pub generation: u64,
    /// Boost-worthy events that opened or refreshed a window.
    pub triggers_accepted: u64,
    /// Boost-worthy events dropped inside the debounce window.
    pub triggers_debounced: u64,
    /// Boost-worthy events dropped because boosting is disabled.
    pub triggers_disabled: u64,
    /// Wake messages delivered to cluster workers.
    pub wakes_sent: u64,
    /// Wakes merged into one already pending.
    pub wakes_coalesced: u64,
    /// Worker passes over their cluster.
    pub worker_runs: u64,
    /// Worker passes skipped because their window had already expired.
    pub stale_wakes: u64,
    /// CPUs skipped because their policy could not be read.
    pub policy_fetch_failures: u64,
    /// Re-evaluation requests the governor rejected.
    pub reevaluation_failures: u64,
    /// Rejected scheduler boost requests.
    pub sched_boost_failures: u64,
    /// Expiry deadlines armed.
    pub expiries_armed: u64,
    /// Expiries that reset the floors.
    pub expiries_fired: u64,
    /// Expiries discarded because a newer cycle had started.
    pub expiries_stale: u64,
    /// Wake-to-effect latency per cluster; `None` for clusters without a worker.
    pub wake_latency: Vec<Option<LatencySnapshot>>,
}

impl BoostStats {
    pub(crate) fn from_counters(c: &BoostCounters) -> Self {
        Self {
            triggers_accepted: BoostCounters::read(&c.triggers_accepted),
            triggers_debounced: BoostCounters::read(&c.triggers_debounced),
            triggers_disabled: BoostCounters::read(&c.triggers_disabled),
            wakes_sent: BoostCounters::read(&c.wakes_sent),
            wakes_coalesced: BoostCounters::read(&c.wakes_coalesced),
            worker_runs: BoostCounters::read(&c.worker_runs),
            stale_wakes: BoostCounters::read(&c.stale_wakes),
            policy_fetch_failures: BoostCounters::read(&c.policy_fetch_failures),
            reevaluation_failures: BoostCounters::read(&c.reevaluation_failures),
            sched_boost_failures: BoostCounters::read(&c.sched_boost_failures),
            expiries_armed: BoostCounters::read(&c.expiries_armed),
            expiries_fired: BoostCounters::read(&c.expiries_fired),
            expiries_stale: BoostCounters::read(&c.expiries_stale),
            ..Self::default()
        }
    }
}
