//! Shared boost state and the two writers of `active_floor`.
//!
//! Every accepted trigger opens a new *generation*. Floor writes happen
//! under the cycle lock and are tied to the generation they belong to:
//!
//! - a worker only applies floors while the current generation has not expired
//! - the expiry task only resets the generation it was armed for, and only once
//!
//! A late worker therefore cannot re-raise floors after their window closed,
//! and a superseded expiry cannot clear the floors of a fresh cycle.

use crate::platform::{ClusterTopology, CpuPolicy, FrequencyGovernor, Khz, SchedulerBoost};
use crate::stats::BoostCounters;
use crate::sync_record::SyncTable;
use crate::tunables::Tunables;
use boost_common::state::BoostPhase;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Mutable cycle bookkeeping, guarded by the cycle lock.
#[derive(Debug, Default)]
struct CycleState {
    /// Last generation whose floors were reset.
    expired_generation: u64,
    /// Scheduler boost requested and not yet released.
    sched_boost_active: bool,
}

/// Result of an expiry firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireOutcome {
    /// Floors were cleared and policies re-evaluated.
    Reset,
    /// A newer cycle started after this expiry was armed.
    Superseded,
    /// This generation was already reset.
    AlreadyExpired,
}

/// State shared by the input filter, cluster workers and expiry task.
pub struct BoostEngine {
    pub(crate) topology: Arc<ClusterTopology>,
    pub(crate) records: Arc<SyncTable>,
    pub(crate) tunables: Arc<Tunables>,
    pub(crate) governor: Arc<dyn FrequencyGovernor>,
    sched_boost: Arc<dyn SchedulerBoost>,
    pub(crate) counters: BoostCounters,
    generation: AtomicU64,
    cycle: Mutex<CycleState>,
}

impl std::fmt::Debug for BoostEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoostEngine")
            .field("clusters", &self.topology.cluster_count())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl BoostEngine {
    pub(crate) fn new(
        topology: Arc<ClusterTopology>,
        records: Arc<SyncTable>,
        tunables: Arc<Tunables>,
        governor: Arc<dyn FrequencyGovernor>,
        sched_boost: Arc<dyn SchedulerBoost>,
    ) -> Self {
        Self {
            topology,
            records,
            tunables,
            governor,
            sched_boost,
            counters: BoostCounters::default(),
            generation: AtomicU64::new(0),
            cycle: Mutex::new(CycleState::default()),
        }
    }

    fn lock_cycle(&self) -> MutexGuard<'_, CycleState> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest generation.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Open a new cycle and return its generation.
    #[inline]
    pub(crate) fn begin_cycle(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Current phase.
    pub fn phase(&self) -> BoostPhase {
        let cycle = self.lock_cycle();
        BoostPhase::from_generations(self.generation(), cycle.expired_generation)
    }

    /// Apply the configured frequency of `cluster` as its floor.
    ///
    /// Runs on the cluster's worker thread. The floor is written to every
    /// online member and to the owner of each member's policy, which is the
    /// record the enforcer reads even while the owner is offline. Returns
    /// the applied floor, or `None` when the current window already expired.
    pub(crate) fn boost_cluster(&self, cluster: usize) -> Option<Khz> {
        let members: Vec<usize> = self
            .governor
            .online_cpus()
            .into_iter()
            .filter(|&cpu| self.topology.cluster_of(cpu) == Some(cluster))
            .collect();

        let policies: Vec<(usize, CpuPolicy)> = members
            .iter()
            .filter_map(|&cpu| match self.governor.get_policy(cpu) {
                Ok(policy) => Some((cpu, policy)),
                Err(e) => {
                    BoostCounters::bump(&self.counters.policy_fetch_failures);
                    warn!(cpu, error = %e, "Skipping CPU without usable policy");
                    None
                }
            })
            .collect();

        let floor = self.tunables.cluster_freq(cluster);
        {
            let cycle = self.lock_cycle();
            if cycle.expired_generation == self.generation() {
                BoostCounters::bump(&self.counters.stale_wakes);
                debug!(cluster, "Window already expired, skipping boost");
                return None;
            }
            let owners = policies.iter().map(|(_, policy)| policy.cpu);
            for cpu in members.iter().copied().chain(owners) {
                if let Some(record) = self.records.get(cpu) {
                    record.set_active_floor(floor);
                }
            }
        }

        for (cpu, policy) in &policies {
            if policy.min < floor {
                if let Err(e) = self.governor.request_policy_reevaluation(*cpu) {
                    BoostCounters::bump(&self.counters.reevaluation_failures);
                    warn!(cpu = *cpu, error = %e, "Policy re-evaluation failed");
                }
            }
        }

        if floor != 0 && self.tunables.sched_boost_on_input() {
            self.activate_sched_boost();
        }

        debug!(cluster, floor_khz = floor, cpus = ?members, "Cluster boosted");
        Some(floor)
    }

    /// Request the scheduler boost once per window.
    fn activate_sched_boost(&self) {
        let mut cycle = self.lock_cycle();
        if cycle.sched_boost_active || cycle.expired_generation == self.generation() {
            return;
        }
        match self.sched_boost.set_boost(true) {
            Ok(()) => {
                cycle.sched_boost_active = true;
                debug!("Scheduler boost enabled");
            }
            Err(e) => {
                BoostCounters::bump(&self.counters.sched_boost_failures);
                error!(error = %e, "Scheduler boost enable failed");
            }
        }
    }

    /// Reset floors for `generation` if it is still the current cycle.
    ///
    /// The scheduler boost is released while the cycle lock is held, so a
    /// window opening concurrently enables it only after the release.
    pub(crate) fn expire(&self, generation: u64) -> ExpireOutcome {
        {
            let mut cycle = self.lock_cycle();
            if generation != self.generation() {
                BoostCounters::bump(&self.counters.expiries_stale);
                debug!(generation, current = self.generation(), "Superseded expiry ignored");
                return ExpireOutcome::Superseded;
            }
            if cycle.expired_generation == generation {
                return ExpireOutcome::AlreadyExpired;
            }
            debug!(generation, "Resetting input boost floors for all CPUs");
            self.records.clear_floors();
            cycle.expired_generation = generation;
            if std::mem::take(&mut cycle.sched_boost_active) {
                self.release_sched_boost();
            }
        }

        BoostCounters::bump(&self.counters.expiries_fired);
        self.update_policy_online();
        ExpireOutcome::Reset
    }

    /// Clear all floors regardless of generation. Used on shutdown.
    pub(crate) fn reset_all(&self) {
        {
            let mut cycle = self.lock_cycle();
            self.records.clear_floors();
            cycle.expired_generation = self.generation();
            if std::mem::take(&mut cycle.sched_boost_active) {
                self.release_sched_boost();
            }
        }
        self.update_policy_online();
        info!("Boost floors released");
    }

    fn release_sched_boost(&self) {
        if let Err(e) = self.sched_boost.set_boost(false) {
            BoostCounters::bump(&self.counters.sched_boost_failures);
            error!(error = %e, "Scheduler boost disable failed");
        }
    }

    /// Re-evaluate one online CPU per cluster; policies span the cluster.
    fn update_policy_online(&self) {
        let online = self.governor.online_cpus();
        for (index, cpus) in self.topology.clusters() {
            let Some(&cpu) = online.iter().find(|cpu| cpus.contains(cpu)) else {
                debug!(cluster = index, "No online CPU, skipping re-evaluation");
                continue;
            };
            if let Err(e) = self.governor.request_policy_reevaluation(cpu) {
                BoostCounters::bump(&self.counters.reevaluation_failures);
                warn!(cluster = index, cpu, error = %e, "Policy re-evaluation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcer::FloorEnforcer;
    use crate::simulated::{SimulatedGovernor, SimulatedSchedBoost};

    struct Rig {
        engine: BoostEngine,
        governor: Arc<SimulatedGovernor>,
        sched: Arc<SimulatedSchedBoost>,
    }

    fn rig(freq: &str) -> Rig {
        let topology = Arc::new(ClusterTopology::new(4, vec![vec![0, 1], vec![2, 3]]).unwrap());
        let records = Arc::new(SyncTable::new(4));
        let tunables = Arc::new(Tunables::new(Arc::clone(&topology), Arc::clone(&records)));
        tunables.set_boost_freq(freq).unwrap();
        let governor = Arc::new(SimulatedGovernor::new(&topology, 300_000, 2_000_000));
        governor.register_adjuster(Arc::new(FloorEnforcer::new(Arc::clone(&records))));
        let sched = Arc::new(SimulatedSchedBoost::default());
        let engine = BoostEngine::new(
            topology,
            records,
            tunables,
            Arc::clone(&governor) as Arc<dyn FrequencyGovernor>,
            Arc::clone(&sched) as Arc<dyn SchedulerBoost>,
        );
        Rig { engine, governor, sched }
    }

    #[test]
    fn test_boost_then_expire() {
        let r = rig("0:500000 2:800000");
        assert_eq!(r.engine.phase(), BoostPhase::Idle);
        let generation = r.engine.begin_cycle();
        assert_eq!(r.engine.boost_cluster(0), Some(500_000));
        assert_eq!(r.engine.boost_cluster(1), Some(800_000));
        assert_eq!(r.engine.phase(), BoostPhase::Active);
        assert_eq!(r.governor.policy_min(1), Some(500_000));
        assert_eq!(r.governor.policy_min(3), Some(800_000));

        assert_eq!(r.engine.expire(generation), ExpireOutcome::Reset);
        assert_eq!(r.engine.phase(), BoostPhase::Idle);
        assert_eq!(r.engine.records.active_floor(2), 0);
        assert_eq!(r.governor.policy_min(2), Some(300_000));
    }

    #[test]
    fn test_late_worker_does_not_reapply() {
        let r = rig("1000000");
        let generation = r.engine.begin_cycle();
        r.engine.expire(generation);
        assert_eq!(r.engine.boost_cluster(0), None);
        assert_eq!(r.engine.records.active_floor(0), 0);
        assert_eq!(r.governor.policy_min(0), Some(300_000));
    }

    #[test]
    fn test_superseded_expiry_keeps_new_cycle() {
        let r = rig("1000000");
        let first = r.engine.begin_cycle();
        r.engine.boost_cluster(0);
        let second = r.engine.begin_cycle();
        assert_eq!(r.engine.expire(first), ExpireOutcome::Superseded);
        assert_eq!(r.engine.records.active_floor(0), 1_000_000);
        assert_eq!(r.engine.expire(second), ExpireOutcome::Reset);
        assert_eq!(r.engine.expire(second), ExpireOutcome::AlreadyExpired);
        assert_eq!(r.engine.records.active_floor(0), 0);
    }

    #[test]
    fn test_policy_fetch_failure_skips_cpu() {
        let r = rig("1000000");
        r.governor.fail_policy_fetch(0, true);
        r.engine.begin_cycle();
        assert_eq!(r.engine.boost_cluster(0), Some(1_000_000));
        assert_eq!(r.engine.records.active_floor(0), 1_000_000);
        assert_eq!(r.governor.reevaluations(0), 0);
        // CPU1 shares the policy and still raises it.
        assert_eq!(r.governor.reevaluations(1), 1);
        assert_eq!(r.governor.policy_min(0), Some(1_000_000));
    }

    #[test]
    fn test_offline_cpu_keeps_zero_floor() {
        let r = rig("1000000");
        r.governor.set_online(1, false);
        r.engine.begin_cycle();
        r.engine.boost_cluster(0);
        assert_eq!(r.engine.records.active_floor(0), 1_000_000);
        assert_eq!(r.engine.records.active_floor(1), 0);
    }

    #[test]
    fn test_offline_policy_owner_still_boosted() {
        let r = rig("1000000");
        r.governor.set_online(0, false);
        r.engine.begin_cycle();
        assert_eq!(r.engine.boost_cluster(0), Some(1_000_000));
        // CPU0 owns the policy; the enforcer reads its record.
        assert_eq!(r.engine.records.active_floor(0), 1_000_000);
        assert_eq!(r.engine.records.active_floor(1), 1_000_000);
        assert_eq!(r.governor.policy_min(1), Some(1_000_000));
    }

    #[test]
    fn test_cluster_floor_uniform_under_concurrent_updates() {
        let r = rig("0:500000 2:500000");
        let engine = Arc::new(r.engine);
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let writer = {
            let engine = Arc::clone(&engine);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut flip = false;
                while !stop.load(Ordering::Relaxed) {
                    let value = if flip { "0:500000 1:900000" } else { "1:900000 0:500000" };
                    engine.tunables.set_boost_freq(value).unwrap();
                    engine.tunables.set_boost_freq(if flip { "700000" } else { "300000" }).unwrap();
                    flip = !flip;
                }
            })
        };

        engine.begin_cycle();
        for _ in 0..2_000 {
            let floor = engine.boost_cluster(0).unwrap();
            let (a, b) = (engine.records.active_floor(0), engine.records.active_floor(1));
            assert_eq!(a, b, "cluster members diverged");
            assert_eq!(a, floor);
            assert!([300_000, 500_000, 700_000].contains(&floor), "unexpected floor {floor}");
        }

        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();
    }

    /// Scheduler boost whose release is slow enough to overlap a new window.
    #[derive(Default)]
    struct SlowRelease {
        active: std::sync::atomic::AtomicBool,
        releasing: std::sync::atomic::AtomicBool,
    }

    impl SchedulerBoost for SlowRelease {
        fn set_boost(&self, enable: bool) -> boost_common::error::BoostResult<()> {
            if !enable {
                self.releasing.store(true, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(150));
            }
            self.active.store(enable, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_release_does_not_override_next_window() {
        let topology = Arc::new(ClusterTopology::new(2, vec![vec![0, 1]]).unwrap());
        let records = Arc::new(SyncTable::new(2));
        let tunables = Arc::new(Tunables::new(Arc::clone(&topology), Arc::clone(&records)));
        tunables.set_boost_freq("1000000").unwrap();
        tunables.set_sched_boost_on_input(true);
        let governor = Arc::new(SimulatedGovernor::new(&topology, 300_000, 2_000_000));
        let sched = Arc::new(SlowRelease::default());
        let engine = Arc::new(BoostEngine::new(
            topology,
            records,
            tunables,
            governor as Arc<dyn FrequencyGovernor>,
            Arc::clone(&sched) as Arc<dyn SchedulerBoost>,
        ));

        let first = engine.begin_cycle();
        engine.boost_cluster(0);
        assert!(sched.active.load(Ordering::SeqCst));

        let expiring = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.expire(first))
        };
        while !sched.releasing.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        engine.begin_cycle();
        assert_eq!(engine.boost_cluster(0), Some(1_000_000));
        assert_eq!(expiring.join().unwrap(), ExpireOutcome::Reset);

        assert_eq!(engine.phase(), BoostPhase::Active);
        assert!(sched.active.load(Ordering::SeqCst));
    }

    #[test]
    fn test_sched_boost_once_per_window() {
        let r = rig("1000000");
        r.engine.tunables.set_sched_boost_on_input(true);
        let generation = r.engine.begin_cycle();
        r.engine.boost_cluster(0);
        r.engine.boost_cluster(1);
        assert!(r.sched.is_active());
        assert_eq!(r.sched.enables(), 1);
        r.engine.expire(generation);
        assert!(!r.sched.is_active());
        assert_eq!(r.sched.disables(), 1);
    }

    #[test]
    fn test_sched_boost_failure_is_counted() {
        let r = rig("1000000");
        r.engine.tunables.set_sched_boost_on_input(true);
        r.sched.set_failing(true);
        r.engine.begin_cycle();
        assert_eq!(r.engine.boost_cluster(0), Some(1_000_000));
        assert_eq!(r.engine.counters.sched_boost_failures.load(Ordering::Relaxed), 1);
    }
}
