//! In-process platform for tests and `--simulated` runs.
//!
//! The simulated governor keeps one policy per cluster, owned by the
//! cluster's first CPU, and re-evaluates synchronously through the
//! registered adjusters just like the kernel framework does.

use crate::platform::{
    ClusterTopology, CpuPolicy, FrequencyGovernor, Khz, PolicyAdjuster, PolicyLimits,
    SchedulerBoost, TopologySource,
};
use boost_common::config::SimulatedConfig;
use boost_common::error::{BoostError, BoostResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::trace;

/// Fixed topology.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    nr_cpus: usize,
    clusters: Vec<Vec<usize>>,
}

impl StaticTopology {
    /// Topology with the given clusters; `nr_cpus` is one past the highest CPU.
    #[must_use]
    pub fn new(clusters: Vec<Vec<usize>>) -> Self {
        let nr_cpus = clusters.iter().flatten().max().map_or(0, |&cpu| cpu + 1);
        Self { nr_cpus, clusters }
    }

    /// Topology described by a [`SimulatedConfig`].
    #[must_use]
    pub fn from_config(config: &SimulatedConfig) -> Self {
        Self::new(config.clusters.clone())
    }
}

impl TopologySource for StaticTopology {
    fn cluster_topology(&self) -> BoostResult<ClusterTopology> {
        ClusterTopology::new(self.nr_cpus, self.clusters.clone())
    }
}

#[derive(Debug, Clone, Copy)]
struct SimPolicy {
    owner: usize,
    base_min: Khz,
    base_max: Khz,
    min: Khz,
    max: Khz,
    cur: Khz,
}

#[derive(Debug)]
struct GovState {
    /// Policy index per CPU.
    policy_of: Vec<Option<usize>>,
    policies: Vec<SimPolicy>,
    online: Vec<bool>,
    failing: HashSet<usize>,
    reevaluations: Vec<u64>,
}

/// Governor backed by plain memory.
pub struct SimulatedGovernor {
    state: Mutex<GovState>,
    adjusters: RwLock<Vec<Arc<dyn PolicyAdjuster>>>,
}

impl std::fmt::Debug for SimulatedGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedGovernor")
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl SimulatedGovernor {
    /// One policy per cluster of `topology`, all CPUs online, running at `min_khz`.
    #[must_use]
    pub fn new(topology: &ClusterTopology, min_khz: Khz, max_khz: Khz) -> Self {
        let nr_cpus = topology.nr_cpus();
        let mut policy_of = vec![None; nr_cpus];
        let mut policies = Vec::with_capacity(topology.cluster_count());
        for (index, cpus) in topology.clusters() {
            for &cpu in cpus {
                policy_of[cpu] = Some(index);
            }
            policies.push(SimPolicy {
                owner: cpus.first().copied().unwrap_or_default(),
                base_min: min_khz,
                base_max: max_khz,
                min: min_khz,
                max: max_khz,
                cur: min_khz,
            });
        }
        Self {
            state: Mutex::new(GovState {
                policy_of,
                policies,
                online: vec![true; nr_cpus],
                failing: HashSet::new(),
                reevaluations: vec![0; nr_cpus],
            }),
            adjusters: RwLock::new(Vec::new()),
        }
    }

    /// Governor described by a [`SimulatedConfig`].
    ///
    /// # Errors
    ///
    /// [`BoostError::Topology`] if the configured clusters are inconsistent.
    pub fn from_config(config: &SimulatedConfig) -> BoostResult<Self> {
        let topology = StaticTopology::from_config(config).cluster_topology()?;
        Ok(Self::new(&topology, config.min_khz, config.max_khz))
    }

    fn lock(&self) -> MutexGuard<'_, GovState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bring `cpu` online or offline.
    pub fn set_online(&self, cpu: usize, online: bool) {
        if let Some(slot) = self.lock().online.get_mut(cpu) {
            *slot = online;
        }
    }

    /// Make `get_policy(cpu)` fail.
    pub fn fail_policy_fetch(&self, cpu: usize, fail: bool) {
        let mut state = self.lock();
        if fail {
            state.failing.insert(cpu);
        } else {
            state.failing.remove(&cpu);
        }
    }

    /// Effective minimum of the policy covering `cpu`.
    pub fn policy_min(&self, cpu: usize) -> Option<Khz> {
        let state = self.lock();
        let index = (*state.policy_of.get(cpu)?)?;
        Some(state.policies[index].min)
    }

    /// Re-evaluations requested for `cpu`.
    pub fn reevaluations(&self, cpu: usize) -> u64 {
        self.lock().reevaluations.get(cpu).copied().unwrap_or_default()
    }

    /// Re-evaluations requested across all CPUs.
    pub fn total_reevaluations(&self) -> u64 {
        self.lock().reevaluations.iter().sum()
    }
}

impl FrequencyGovernor for SimulatedGovernor {
    fn online_cpus(&self) -> Vec<usize> {
        let state = self.lock();
        state
            .online
            .iter()
            .enumerate()
            .filter_map(|(cpu, &on)| on.then_some(cpu))
            .collect()
    }

    fn get_policy(&self, cpu: usize) -> BoostResult<CpuPolicy> {
        let state = self.lock();
        let fetch_error = |reason: &str| BoostError::PolicyFetch {
            cpu,
            reason: reason.to_string(),
        };
        if state.failing.contains(&cpu) {
            return Err(fetch_error("injected failure"));
        }
        let index = state
            .policy_of
            .get(cpu)
            .copied()
            .flatten()
            .ok_or_else(|| fetch_error("no policy"))?;
        let p = state.policies[index];
        Ok(CpuPolicy {
            cpu: p.owner,
            min: p.min,
            max: p.max,
            cur: p.cur,
        })
    }

    fn request_policy_reevaluation(&self, cpu: usize) -> BoostResult<()> {
        let (index, mut limits) = {
            let mut state = self.lock();
            let index = state
                .policy_of
                .get(cpu)
                .copied()
                .flatten()
                .ok_or_else(|| BoostError::PolicyFetch {
                    cpu,
                    reason: "no policy".to_string(),
                })?;
            state.reevaluations[cpu] += 1;
            let p = state.policies[index];
            (
                index,
                PolicyLimits {
                    cpu: p.owner,
                    min: p.base_min,
                    max: p.base_max,
                },
            )
        };

        for adjuster in self
            .adjusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            adjuster.adjust(&mut limits);
        }

        let mut state = self.lock();
        let policy = &mut state.policies[index];
        policy.max = limits.max;
        policy.min = limits.min.min(limits.max);
        policy.cur = policy.cur.clamp(policy.min, policy.max);
        trace!(cpu, min = policy.min, max = policy.max, "Simulated policy updated");
        Ok(())
    }

    fn register_adjuster(&self, adjuster: Arc<dyn PolicyAdjuster>) {
        self.adjusters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(adjuster);
    }
}

/// Scheduler boost that only records requests.
#[derive(Debug, Default)]
pub struct SimulatedSchedBoost {
    active: AtomicBool,
    enables: AtomicU64,
    disables: AtomicU64,
    fail: AtomicBool,
}

impl SimulatedSchedBoost {
    /// Whether the boost is currently on.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Accepted enable requests.
    pub fn enables(&self) -> u64 {
        self.enables.load(Ordering::Relaxed)
    }

    /// Accepted disable requests.
    pub fn disables(&self) -> u64 {
        self.disables.load(Ordering::Relaxed)
    }

    /// Reject all further requests.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}

impl SchedulerBoost for SimulatedSchedBoost {
    fn set_boost(&self, enable: bool) -> BoostResult<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(BoostError::SchedulerBoost("injected failure".to_string()));
        }
        self.active.store(enable, Ordering::Release);
        let counter = if enable { &self.enables } else { &self.disables };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
