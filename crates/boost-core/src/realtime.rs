//! Real-time scheduling for cluster workers.
//!
//! Workers run at the highest FIFO priority by default so a wake is served
//! ahead of the work the input is about to cause. Missing privileges are not
//! fatal: the worker logs a warning and keeps its normal priority.

#![allow(unused_imports)] // Platform-specific code may not use all imports

use boost_common::config::{RealtimeConfig, SchedPolicy};
use boost_common::error::{BoostError, BoostResult};
use tracing::{debug, info, warn};

/// What was applied to the calling thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealtimeStatus {
    /// Applied scheduler policy.
    pub scheduler_policy: Option<SchedPolicy>,
    /// Applied scheduler priority.
    pub scheduler_priority: Option<u8>,
    /// CPUs the thread is pinned to.
    pub cpu_affinity: Option<Vec<usize>>,
}

/// Elevate the calling thread according to `config`.
///
/// `cpus` is the affinity applied when `pin_workers` is set.
///
/// # Errors
///
/// Returns [`BoostError::Config`] when the kernel rejects the request for a
/// reason other than missing privileges.
pub fn elevate_current_thread(config: &RealtimeConfig, cpus: &[usize]) -> BoostResult<RealtimeStatus> {
    if !config.enabled {
        debug!("Real-time scheduling disabled in configuration");
        return Ok(RealtimeStatus::default());
    }

    let (scheduler_policy, scheduler_priority) = set_scheduler(config.policy, config.priority)?;
    let cpu_affinity = if config.pin_workers {
        set_cpu_affinity(cpus)?
    } else {
        None
    };

    Ok(RealtimeStatus {
        scheduler_policy,
        scheduler_priority,
        cpu_affinity,
    })
}

#[cfg(target_os = "linux")]
fn set_scheduler(policy: SchedPolicy, priority: u8) -> BoostResult<(Option<SchedPolicy>, Option<u8>)> {
    let linux_policy = match policy {
        SchedPolicy::Fifo => libc::SCHED_FIFO,
        SchedPolicy::Rr => libc::SCHED_RR,
        SchedPolicy::Other => return Ok((Some(SchedPolicy::Other), None)),
    };

    let clamped = priority.clamp(1, 99);
    if clamped != priority {
        warn!(original = priority, clamped, "Scheduler priority clamped to valid range");
    }

    let param = libc::sched_param {
        sched_priority: i32::from(clamped),
    };
    // SAFETY: pid 0 targets the calling thread and `param` outlives the call.
    let result = unsafe { libc::sched_setscheduler(0, linux_policy, &param) };

    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            warn!(
                "sched_setscheduler failed with EPERM - worker runs without RT priority. \
                 Grant CAP_SYS_NICE or run as root."
            );
            return Ok((None, None));
        }
        return Err(BoostError::Config(format!("sched_setscheduler failed: {err}")));
    }

    debug!(?policy, priority = clamped, "Worker scheduler configured");
    Ok((Some(policy), Some(clamped)))
}

#[cfg(not(target_os = "linux"))]
fn set_scheduler(policy: SchedPolicy, priority: u8) -> BoostResult<(Option<SchedPolicy>, Option<u8>)> {
    warn!(?policy, priority, "Real-time scheduling not available on this platform");
    Ok((None, None))
}

#[cfg(target_os = "linux")]
fn set_cpu_affinity(cpus: &[usize]) -> BoostResult<Option<Vec<usize>>> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    if cpus.is_empty() {
        return Ok(None);
    }

    let mut cpu_set = CpuSet::new();
    for &cpu in cpus {
        cpu_set
            .set(cpu)
            .map_err(|e| BoostError::Config(format!("Invalid CPU index {cpu}: {e}")))?;
    }

    match sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        Ok(()) => {
            debug!(?cpus, "Worker pinned");
            Ok(Some(cpus.to_vec()))
        }
        Err(nix::errno::Errno::EINVAL) => {
            warn!(?cpus, "Invalid CPU set - some CPUs may be offline");
            Ok(None)
        }
        Err(e) => Err(BoostError::Config(format!("sched_setaffinity failed: {e}"))),
    }
}

#[cfg(not(target_os = "linux"))]
fn set_cpu_affinity(cpus: &[usize]) -> BoostResult<Option<Vec<usize>>> {
    if !cpus.is_empty() {
        warn!("CPU affinity not available on this platform");
    }
    Ok(None)
}

/// Real-time capabilities of the running process.
#[derive(Debug, Clone, Default)]
pub struct RtCapabilities {
    /// Whether running as root.
    pub is_root: bool,
    /// `RLIMIT_RTPRIO` soft limit.
    pub rtprio_limit: Option<u64>,
}

impl RtCapabilities {
    /// Check if RT scheduling is likely to succeed.
    pub fn can_use_rt_scheduling(&self) -> bool {
        self.is_root || self.rtprio_limit.is_some_and(|l| l > 0)
    }
}

/// Probe the process for real-time capabilities.
#[cfg(target_os = "linux")]
pub fn check_rt_capabilities() -> RtCapabilities {
    // SAFETY: geteuid has no preconditions.
    let mut caps = RtCapabilities {
        is_root: unsafe { libc::geteuid() } == 0,
        ..Default::default()
    };

    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `rlim` is a valid, writable rlimit.
    if unsafe { libc::getrlimit(libc::RLIMIT_RTPRIO, &mut rlim) } == 0 {
        caps.rtprio_limit = Some(rlim.rlim_cur);
    }
    caps
}

#[cfg(not(target_os = "linux"))]
pub fn check_rt_capabilities() -> RtCapabilities {
    RtCapabilities::default()
}

/// Log a one-line summary of what workers will get.
pub fn log_rt_capabilities(config: &RealtimeConfig) {
    if !config.enabled || config.policy == SchedPolicy::Other {
        return;
    }
    let caps = check_rt_capabilities();
    if caps.can_use_rt_scheduling() {
        info!(policy = ?config.policy, priority = config.priority, "Workers will run with RT priority");
    } else {
        warn!(
            rtprio_limit = ?caps.rtprio_limit,
            "No RT scheduling privileges; workers keep normal priority"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_rt() {
        let config = RealtimeConfig {
            enabled: false,
            ..Default::default()
        };
        let status = elevate_current_thread(&config, &[0]).unwrap();
        assert_eq!(status, RealtimeStatus::default());
    }

    #[test]
    fn test_other_policy_is_noop() {
        let config = RealtimeConfig {
            policy: SchedPolicy::Other,
            ..Default::default()
        };
        let status = elevate_current_thread(&config, &[]).unwrap();
        assert!(status.scheduler_priority.is_none());
        assert!(status.cpu_affinity.is_none());
    }

    #[test]
    fn test_rt_capabilities() {
        let caps = check_rt_capabilities();
        let _ = caps.can_use_rt_scheduling();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_empty_affinity_is_noop() {
        assert_eq!(set_cpu_affinity(&[]).unwrap(), None);
    }
}
