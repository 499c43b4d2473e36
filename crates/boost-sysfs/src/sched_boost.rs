//! Scheduler boost through the HMP `sched_boost` knob.

use crate::write_attr;
use boost_common::error::{BoostError, BoostResult};
use boost_core::platform::SchedulerBoost;
use std::path::PathBuf;
use tracing::debug;

/// Writes `1`/`0` to `/proc/sys/kernel/sched_boost`.
#[derive(Debug, Clone)]
pub struct ProcSchedBoost {
    path: PathBuf,
}

impl ProcSchedBoost {
    /// Drive the knob at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SchedulerBoost for ProcSchedBoost {
    fn set_boost(&self, enable: bool) -> BoostResult<()> {
        write_attr(&self.path, if enable { "1" } else { "0" })
            .map_err(|e| BoostError::SchedulerBoost(e.to_string()))?;
        debug!(enable, path = %self.path.display(), "sched_boost written");
        Ok(())
    }
}

/// Used when the platform has no scheduler boost.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSchedBoost;

impl SchedulerBoost for NoSchedBoost {
    fn set_boost(&self, _enable: bool) -> BoostResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_knob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sched_boost");
        let boost = ProcSchedBoost::new(&path);
        boost.set_boost(true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1");
        boost.set_boost(false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0");
    }

    #[test]
    fn test_missing_knob_is_error() {
        let boost = ProcSchedBoost::new("/nonexistent/dir/sched_boost");
        assert!(matches!(boost.set_boost(true), Err(BoostError::SchedulerBoost(_))));
    }
}
