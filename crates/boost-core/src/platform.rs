//! Collaborator interfaces the boost engine is driven against.
//!
//! The engine never touches the kernel directly. It consumes:
//! - [`TopologySource`] for the CPU → cluster map, read once at startup
//! - [`FrequencyGovernor`] for policies, re-evaluation and the adjuster hook
//! - [`SchedulerBoost`] for the system-wide scheduling bias
//!
//! Linux implementations live in `boost-sysfs`; in-memory ones in
//! [`crate::simulated`].

use boost_common::error::{BoostError, BoostResult};
use std::sync::Arc;

/// Frequency in kHz. Zero means "no boost".
pub type Khz = u32;

/// Immutable CPU → cluster membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTopology {
    /// Member CPUs of each cluster, ascending.
    clusters: Vec<Vec<usize>>,
    /// Cluster index of each CPU, `None` for CPUs outside every cluster.
    cpu_cluster: Vec<Option<usize>>,
}

impl ClusterTopology {
    /// Build a topology over `nr_cpus` CPUs.
    ///
    /// Member lists are sorted; a CPU listed in two clusters, a CPU id
    /// `>= nr_cpus`, an empty cluster or an empty cluster list is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::Topology`] describing the inconsistency.
    pub fn new(nr_cpus: usize, clusters: Vec<Vec<usize>>) -> BoostResult<Self> {
        if clusters.is_empty() {
            return Err(BoostError::Topology(
                "invalid number of clusters: 0".to_string(),
            ));
        }

        let mut cpu_cluster = vec![None; nr_cpus];
        let mut sorted = Vec::with_capacity(clusters.len());
        for (index, mut members) in clusters.into_iter().enumerate() {
            if members.is_empty() {
                return Err(BoostError::Topology(format!("cluster {index} has no CPUs")));
            }
            members.sort_unstable();
            members.dedup();
            for &cpu in &members {
                let slot = cpu_cluster.get_mut(cpu).ok_or_else(|| {
                    BoostError::Topology(format!(
                        "cluster {index} names CPU{cpu} but only {nr_cpus} CPUs exist"
                    ))
                })?;
                if let Some(other) = slot.replace(index) {
                    return Err(BoostError::Topology(format!(
                        "CPU{cpu} belongs to clusters {other} and {index}"
                    )));
                }
            }
            sorted.push(members);
        }

        Ok(Self {
            clusters: sorted,
            cpu_cluster,
        })
    }

    /// Number of CPUs covered by per-CPU state.
    #[must_use]
    pub fn nr_cpus(&self) -> usize {
        self.cpu_cluster.len()
    }

    /// Number of clusters.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Members of cluster `index`, ascending.
    #[must_use]
    pub fn cluster_cpus(&self, index: usize) -> &[usize] {
        self.clusters.get(index).map(Vec::as_slice).unwrap_or_default()
    }

    /// Cluster of `cpu`.
    #[must_use]
    pub fn cluster_of(&self, cpu: usize) -> Option<usize> {
        self.cpu_cluster.get(cpu).copied().flatten()
    }

    /// Iterate over `(index, members)`.
    pub fn clusters(&self) -> impl Iterator<Item = (usize, &[usize])> {
        self.clusters.iter().map(Vec::as_slice).enumerate()
    }
}

/// Source of the cluster topology.
pub trait TopologySource {
    /// Read the topology. Called once at startup.
    ///
    /// # Errors
    ///
    /// A failure here disables boosting entirely.
    fn cluster_topology(&self) -> BoostResult<ClusterTopology>;
}

/// Snapshot of one CPU's frequency policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuPolicy {
    /// CPU owning the policy (first CPU of the policy's span).
    pub cpu: usize,
    /// Current minimum.
    pub min: Khz,
    /// Current maximum.
    pub max: Khz,
    /// Current operating frequency.
    pub cur: Khz,
}

/// Proposed limits passed through the adjuster chain during re-evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyLimits {
    /// CPU being re-evaluated.
    pub cpu: usize,
    /// Proposed minimum.
    pub min: Khz,
    /// Proposed maximum.
    pub max: Khz,
}

/// Hook run synchronously by the governor before it finalizes a policy.
///
/// Implementations must not block or allocate; they may only narrow the
/// proposed range.
pub trait PolicyAdjuster: Send + Sync {
    /// Adjust the proposed limits in place.
    fn adjust(&self, limits: &mut PolicyLimits);
}

/// Frequency governor framework.
pub trait FrequencyGovernor: Send + Sync {
    /// CPUs currently online, ascending. Not an atomic snapshot.
    fn online_cpus(&self) -> Vec<usize>;

    /// Fetch the current policy of `cpu`.
    ///
    /// # Errors
    ///
    /// [`BoostError::PolicyFetch`] when the CPU has no usable policy.
    fn get_policy(&self, cpu: usize) -> BoostResult<CpuPolicy>;

    /// Recompute the policy of `cpu`, running every registered adjuster
    /// synchronously on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the new limits could not be applied.
    fn request_policy_reevaluation(&self, cpu: usize) -> BoostResult<()>;

    /// Register an adjuster for all future re-evaluations.
    fn register_adjuster(&self, adjuster: Arc<dyn PolicyAdjuster>);
}

/// System-wide scheduler bias towards high-capacity CPUs.
pub trait SchedulerBoost: Send + Sync {
    /// Enable or disable the bias.
    ///
    /// # Errors
    ///
    /// [`BoostError::SchedulerBoost`] when the request is rejected.
    fn set_boost(&self, enable: bool) -> BoostResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_sorted_members() {
        let topo = ClusterTopology::new(4, vec![vec![1, 0], vec![3, 2]]).unwrap();
        assert_eq!(topo.cluster_count(), 2);
        assert_eq!(topo.cluster_cpus(0), &[0, 1]);
        assert_eq!(topo.cluster_of(3), Some(1));
        assert_eq!(topo.nr_cpus(), 4);
    }

    #[test]
    fn test_cpu_outside_clusters() {
        let topo = ClusterTopology::new(3, vec![vec![0, 1]]).unwrap();
        assert_eq!(topo.cluster_of(2), None);
        assert_eq!(topo.cluster_of(7), None);
        assert!(topo.cluster_cpus(5).is_empty());
    }

    #[test]
    fn test_empty_topology_rejected() {
        let err = ClusterTopology::new(4, vec![]).unwrap_err();
        assert!(matches!(err, BoostError::Topology(_)));
    }

    #[test]
    fn test_overlapping_clusters_rejected() {
        let err = ClusterTopology::new(4, vec![vec![0, 1], vec![1, 2]]).unwrap_err();
        assert!(matches!(err, BoostError::Topology(_)));
    }

    #[test]
    fn test_cpu_out_of_range_rejected() {
        assert!(ClusterTopology::new(2, vec![vec![0, 2]]).is_err());
        assert!(ClusterTopology::new(2, vec![vec![]]).is_err());
    }
}
