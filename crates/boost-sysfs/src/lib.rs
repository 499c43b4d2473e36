//! Linux backends for the boost engine.
//!
//! This crate provides:
//! - [`SysfsTopology`] reading clusters from `/sys/devices/system/cpu`
//! - [`SysfsGovernor`] driving cpufreq policies through `scaling_min_freq`
//! - [`ProcSchedBoost`] toggling the HMP scheduler boost knob
//! - [`EvdevInputSource`] feeding `/dev/input/event*` into an input filter

pub mod governor;
#[cfg(target_os = "linux")]
pub mod input;
pub mod sched_boost;
pub mod topology;

pub use governor::*;
#[cfg(target_os = "linux")]
pub use input::*;
pub use sched_boost::*;
pub use topology::*;

use boost_common::error::BoostError;
use std::path::Path;

/// Read a sysfs attribute, trimmed.
pub(crate) fn read_attr(path: &Path) -> Result<String, BoostError> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| BoostError::Io(format!("{}: {e}", path.display())))
}

/// Write a sysfs attribute.
pub(crate) fn write_attr(path: &Path, value: &str) -> Result<(), BoostError> {
    std::fs::write(path, value).map_err(|e| BoostError::Io(format!("{}: {e}", path.display())))
}
