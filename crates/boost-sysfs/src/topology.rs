//! Cluster discovery from the CPU sysfs hierarchy.
//!
//! CPUs sharing a cpufreq policy (`cpuN/cpufreq/related_cpus`) form one
//! cluster. Clusters are ordered by their lowest CPU.

use crate::read_attr;
use boost_common::error::{BoostError, BoostResult};
use boost_core::platform::{ClusterTopology, TopologySource};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Parse a kernel CPU list such as `"0-3,6,8-9"` or `"0 1 2 3"`.
///
/// # Errors
///
/// Returns a description of the first malformed token.
pub fn parse_cpu_list(list: &str) -> Result<Vec<usize>, String> {
    let mut seen = BTreeSet::new();
    for token in list.trim().split([',', ' ']) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some((start, end)) = token.split_once('-') {
            let start: usize = start.trim().parse().map_err(|_| format!("Invalid range start in {token:?}"))?;
            let end: usize = end.trim().parse().map_err(|_| format!("Invalid range end in {token:?}"))?;
            if start > end {
                return Err(format!("Invalid CPU range: {start}-{end}"));
            }
            seen.extend(start..=end);
        } else {
            seen.insert(token.parse().map_err(|_| format!("Invalid CPU: {token}"))?);
        }
    }
    Ok(seen.into_iter().collect())
}

/// Topology read from sysfs.
#[derive(Debug, Clone)]
pub struct SysfsTopology {
    cpu_root: PathBuf,
}

impl SysfsTopology {
    /// Read from `cpu_root` (normally `/sys/devices/system/cpu`).
    pub fn new(cpu_root: impl Into<PathBuf>) -> Self {
        Self {
            cpu_root: cpu_root.into(),
        }
    }

    fn cpu_list(&self, path: &Path) -> BoostResult<Vec<usize>> {
        let raw = read_attr(path).map_err(|e| BoostError::Topology(e.to_string()))?;
        parse_cpu_list(&raw).map_err(|e| BoostError::Topology(format!("{}: {e}", path.display())))
    }
}

impl TopologySource for SysfsTopology {
    fn cluster_topology(&self) -> BoostResult<ClusterTopology> {
        let possible = self.cpu_list(&self.cpu_root.join("possible"))?;
        let nr_cpus = possible.last().map_or(0, |&cpu| cpu + 1);

        let mut clusters: Vec<Vec<usize>> = Vec::new();
        let mut assigned = BTreeSet::new();
        for &cpu in &possible {
            if assigned.contains(&cpu) {
                continue;
            }
            let related_path = self
                .cpu_root
                .join(format!("cpu{cpu}"))
                .join("cpufreq/related_cpus");
            let siblings = match self.cpu_list(&related_path) {
                Ok(list) if !list.is_empty() => list,
                // Offline CPUs may lack a cpufreq directory.
                _ => vec![cpu],
            };
            let members: Vec<usize> = siblings
                .into_iter()
                .filter(|c| *c < nr_cpus && !assigned.contains(c))
                .collect();
            assigned.extend(members.iter().copied());
            debug!(cluster = clusters.len(), cpus = ?members, "Discovered cluster");
            clusters.push(members);
        }

        ClusterTopology::new(nr_cpus, clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-3").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpu_list("0,2,4-5\n").unwrap(), vec![0, 2, 4, 5]);
        assert_eq!(parse_cpu_list("4 5 6 7\n").unwrap(), vec![4, 5, 6, 7]);
        assert_eq!(parse_cpu_list("3,1,1").unwrap(), vec![1, 3]);
        assert_eq!(parse_cpu_list("").unwrap(), Vec::<usize>::new());
        assert!(parse_cpu_list("4-2").is_err());
        assert!(parse_cpu_list("a").is_err());
        assert!(parse_cpu_list("1-").is_err());
    }
}
