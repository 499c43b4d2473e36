//! Policy adjuster that holds the policy minimum at the active floor.
//!
//! Registered with the governor at startup and run synchronously on
//! whichever thread asks for a re-evaluation. It only reads one atomic per
//! call, so it is safe from any context.

use crate::platform::{PolicyAdjuster, PolicyLimits};
use crate::sync_record::SyncTable;
use std::sync::Arc;
use tracing::trace;

/// Raises proposed policy minimums to the CPU's active floor.
#[derive(Debug, Clone)]
pub struct FloorEnforcer {
    records: Arc<SyncTable>,
}

impl FloorEnforcer {
    /// Create an enforcer reading floors from `records`.
    #[must_use]
    pub fn new(records: Arc<SyncTable>) -> Self {
        Self { records }
    }
}

impl PolicyAdjuster for FloorEnforcer {
    #[inline]
    fn adjust(&self, limits: &mut PolicyLimits) {
        let floor = self.records.active_floor(limits.cpu);
        if floor == 0 {
            return;
        }

        trace!(cpu = limits.cpu, min_khz = limits.min, floor_khz = floor, "Policy min before boost");
        // The maximum is left alone; a floor above it is capped by the governor.
        limits.min = limits.min.max(floor);
        trace!(cpu = limits.cpu, min_khz = limits.min, "Policy min after boost");
    }
}
