//! Per-CPU synchronization records.
//!
//! Each CPU owns a cache-padded record with two atomics:
//!
//! - `configured_freq`: what the configuration store wants this CPU boosted to
//! - `active_floor`: the minimum currently enforced
//!
//! # Threading Model
//!
//! - **Configuration store**: writes `configured_freq` under its write lock
//! - **Cluster workers / expiry task**: write `active_floor` under the cycle lock
//! - **Enforcer**: reads `active_floor` lock-free from any context
//!
//! Readers see per-CPU values, not a consistent cross-CPU snapshot.

use crate::platform::Khz;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU32, Ordering};

/// Boost state of one CPU.
#[derive(Debug, Default)]
pub struct SyncRecord {
    configured_freq: AtomicU32,
    active_floor: AtomicU32,
}

impl SyncRecord {
    /// Desired boost frequency.
    #[inline]
    pub fn configured_freq(&self) -> Khz {
        self.configured_freq.load(Ordering::Acquire)
    }

    /// Currently enforced floor.
    #[inline]
    pub fn active_floor(&self) -> Khz {
        self.active_floor.load(Ordering::Acquire)
    }

    pub(crate) fn set_configured_freq(&self, khz: Khz) {
        self.configured_freq.store(khz, Ordering::Release);
    }

    pub(crate) fn set_active_floor(&self, khz: Khz) {
        self.active_floor.store(khz, Ordering::Release);
    }
}

/// Indexed table of [`SyncRecord`]s, one per CPU.
#[derive(Debug)]
pub struct SyncTable {
    records: Box<[CachePadded<SyncRecord>]>,
}

impl SyncTable {
    /// Create zeroed records for `nr_cpus` CPUs.
    #[must_use]
    pub fn new(nr_cpus: usize) -> Self {
        Self {
            records: (0..nr_cpus)
                .map(|_| CachePadded::new(SyncRecord::default()))
                .collect(),
        }
    }

    /// Number of CPUs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the table covers no CPU.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record of `cpu`, if it exists.
    #[inline]
    #[must_use]
    pub fn get(&self, cpu: usize) -> Option<&SyncRecord> {
        self.records.get(cpu).map(|r| &**r)
    }

    /// Floor of `cpu`; 0 for unknown CPUs.
    #[inline]
    #[must_use]
    pub fn active_floor(&self, cpu: usize) -> Khz {
        self.get(cpu).map_or(0, SyncRecord::active_floor)
    }

    /// Configured frequency of `cpu`; 0 for unknown CPUs.
    #[inline]
    #[must_use]
    pub fn configured_freq(&self, cpu: usize) -> Khz {
        self.get(cpu).map_or(0, SyncRecord::configured_freq)
    }

    /// Iterate over `(cpu, record)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SyncRecord)> {
        self.records.iter().map(|r| &**r).enumerate()
    }

    /// True if any CPU has a nonzero configured frequency.
    #[must_use]
    pub fn any_configured(&self) -> bool {
        self.records.iter().any(|r| r.configured_freq() != 0)
    }

    /// Clear every floor.
    pub(crate) fn clear_floors(&self) {
        for record in self.records.iter() {
            record.set_active_floor(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_is_zeroed() {
        let table = SyncTable::new(4);
        assert_eq!(table.len(), 4);
        assert!(!table.any_configured());
        assert!(table.iter().all(|(_, r)| r.active_floor() == 0));
    }

    #[test]
    fn test_unknown_cpu_reads_zero() {
        let table = SyncTable::new(2);
        assert!(table.get(2).is_none());
        assert_eq!(table.active_floor(9), 0);
        assert_eq!(table.configured_freq(9), 0);
    }

    #[test]
    fn test_clear_floors() {
        let table = SyncTable::new(3);
        table.get(1).unwrap().set_active_floor(900_000);
        table.get(2).unwrap().set_configured_freq(900_000);
        assert_eq!(table.active_floor(1), 900_000);

        table.clear_floors();
        assert_eq!(table.active_floor(1), 0);
        // Configuration survives a floor reset.
        assert_eq!(table.configured_freq(2), 900_000);
        assert!(table.any_configured());
    }
}
