//! cpufreq policies through sysfs.
//!
//! Each policy's minimum is remembered the first time the governor sees
//! it. A re-evaluation starts from that baseline, runs the registered
//! adjusters and writes the result to the owner's `scaling_min_freq`,
//! capped at the current maximum.

use crate::topology::parse_cpu_list;
use crate::{read_attr, write_attr};
use boost_common::error::{BoostError, BoostResult};
use boost_core::platform::{CpuPolicy, FrequencyGovernor, Khz, PolicyAdjuster, PolicyLimits};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, warn};

/// Governor backed by `/sys/devices/system/cpu/cpu*/cpufreq`.
pub struct SysfsGovernor {
    cpu_root: PathBuf,
    /// Baseline minimum per policy owner.
    baseline: Mutex<HashMap<usize, Khz>>,
    adjusters: RwLock<Vec<Arc<dyn PolicyAdjuster>>>,
}

impl std::fmt::Debug for SysfsGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysfsGovernor")
            .field("cpu_root", &self.cpu_root)
            .finish_non_exhaustive()
    }
}

impl SysfsGovernor {
    /// Governor rooted at `cpu_root`. Baselines of online policies are
    /// captured immediately.
    pub fn new(cpu_root: impl Into<PathBuf>) -> Self {
        let governor = Self {
            cpu_root: cpu_root.into(),
            baseline: Mutex::new(HashMap::new()),
            adjusters: RwLock::new(Vec::new()),
        };
        for cpu in governor.online_cpus() {
            if let Err(e) = governor.baseline_min(cpu) {
                debug!(cpu, error = %e, "No cpufreq policy");
            }
        }
        governor
    }

    fn cpufreq_dir(&self, cpu: usize) -> PathBuf {
        self.cpu_root.join(format!("cpu{cpu}")).join("cpufreq")
    }

    fn read_khz(path: &Path) -> BoostResult<Khz> {
        let raw = read_attr(path)?;
        raw.parse()
            .map_err(|_| BoostError::Io(format!("{}: not a frequency: {raw:?}", path.display())))
    }

    fn policy_owner(&self, cpu: usize) -> BoostResult<usize> {
        let dir = self.cpufreq_dir(cpu);
        let related = read_attr(&dir.join("related_cpus")).or_else(|_| read_attr(&dir.join("affected_cpus")))?;
        let cpus = parse_cpu_list(&related)
            .map_err(|e| BoostError::Io(format!("related_cpus of CPU{cpu}: {e}")))?;
        Ok(cpus.first().copied().unwrap_or(cpu))
    }

    fn baseline_min(&self, cpu: usize) -> BoostResult<(usize, Khz)> {
        let owner = self.policy_owner(cpu)?;
        let mut baseline = self.baseline.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&min) = baseline.get(&owner) {
            return Ok((owner, min));
        }
        let min = Self::read_khz(&self.cpufreq_dir(owner).join("scaling_min_freq"))?;
        baseline.insert(owner, min);
        debug!(cpu = owner, baseline_khz = min, "Captured policy baseline");
        Ok((owner, min))
    }
}

impl FrequencyGovernor for SysfsGovernor {
    fn online_cpus(&self) -> Vec<usize> {
        match read_attr(&self.cpu_root.join("online")) {
            Ok(list) => parse_cpu_list(&list).unwrap_or_else(|e| {
                warn!(error = %e, "Unparsable online CPU list");
                Vec::new()
            }),
            Err(e) => {
                warn!(error = %e, "Cannot read online CPUs");
                Vec::new()
            }
        }
    }

    fn get_policy(&self, cpu: usize) -> BoostResult<CpuPolicy> {
        let fetch = |e: BoostError| BoostError::PolicyFetch {
            cpu,
            reason: e.to_string(),
        };
        let owner = self.policy_owner(cpu).map_err(fetch)?;
        let dir = self.cpufreq_dir(owner);
        Ok(CpuPolicy {
            cpu: owner,
            min: Self::read_khz(&dir.join("scaling_min_freq")).map_err(fetch)?,
            max: Self::read_khz(&dir.join("scaling_max_freq")).map_err(fetch)?,
            cur: Self::read_khz(&dir.join("scaling_cur_freq")).unwrap_or_default(),
        })
    }

    fn request_policy_reevaluation(&self, cpu: usize) -> BoostResult<()> {
        let (owner, base_min) = self.baseline_min(cpu)?;
        let dir = self.cpufreq_dir(owner);
        let max = Self::read_khz(&dir.join("scaling_max_freq"))?;

        let mut limits = PolicyLimits {
            cpu: owner,
            min: base_min,
            max,
        };
        for adjuster in self
            .adjusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            adjuster.adjust(&mut limits);
        }

        let min = limits.min.min(limits.max);
        write_attr(&dir.join("scaling_min_freq"), &min.to_string())?;
        debug!(cpu = owner, min_khz = min, max_khz = limits.max, "Policy updated");
        Ok(())
    }

    fn register_adjuster(&self, adjuster: Arc<dyn PolicyAdjuster>) {
        self.adjusters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(adjuster);
    }
}
