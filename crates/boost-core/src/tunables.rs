//! Configuration store for boost frequencies, the boost window and the
//! scheduler-boost option.
//!
//! `input_boost_freq` accepts two textual forms:
//!
//! ```text
//! 1300000                 every CPU gets 1300000 kHz
//! 0:1300000 4:800000      CPU0 and CPU4, then propagated per cluster
//! ```
//!
//! A cluster has a single boost frequency. After a paired update the first
//! nonzero value in ascending CPU order wins and every other member mirrors
//! it. Updates are all-or-nothing: on any parse or range error nothing is
//! written.

use crate::platform::{ClusterTopology, Khz};
use crate::sync_record::SyncTable;
use boost_common::config::{DEFAULT_BOOST_WINDOW, MIN_BOOST_WINDOW_MS};
use boost_common::error::{BoostError, BoostResult};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// A parsed `input_boost_freq` update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreqUpdate {
    /// One value for every CPU.
    Uniform(Khz),
    /// Explicit `(cpu, value)` pairs, in input order.
    Pairs(Vec<(usize, Khz)>),
}

/// Parse an `input_boost_freq` value for a system with `nr_cpus` CPUs.
///
/// # Errors
///
/// [`BoostError::InvalidArgument`] on odd separator parity, an unparsable
/// number or a CPU index `>= nr_cpus`.
pub fn parse_boost_freq(input: &str, nr_cpus: usize) -> BoostResult<FreqUpdate> {
    let input = input.trim();
    let separators = input
        .chars()
        .skip(1)
        .filter(|&c| c == ' ' || c == ':')
        .count();

    if separators == 0 {
        return parse_khz(input).map(FreqUpdate::Uniform);
    }

    // Every "cpu:value" pair contributes one ':' and all but the last one ' '.
    if separators % 2 == 0 {
        return Err(BoostError::invalid(format!(
            "malformed boost frequency list {input:?}"
        )));
    }

    let mut pairs = Vec::with_capacity(separators / 2 + 1);
    for token in input.split(' ') {
        let (cpu, value) = token
            .split_once(':')
            .ok_or_else(|| BoostError::invalid(format!("expected cpu:value, got {token:?}")))?;
        let cpu: usize = cpu
            .parse()
            .map_err(|_| BoostError::invalid(format!("invalid CPU index {cpu:?}")))?;
        if cpu >= nr_cpus {
            return Err(BoostError::invalid(format!(
                "CPU{cpu} out of range (have {nr_cpus} CPUs)"
            )));
        }
        pairs.push((cpu, parse_khz(value)?));
    }
    Ok(FreqUpdate::Pairs(pairs))
}

fn parse_khz(s: &str) -> BoostResult<Khz> {
    s.parse()
        .map_err(|_| BoostError::invalid(format!("invalid frequency {s:?}")))
}

/// Parse a boolean the way kernel module parameters accept them.
///
/// # Errors
///
/// [`BoostError::InvalidArgument`] for anything other than
/// `1/0/y/n/Y/N/true/false/on/off`.
pub fn parse_bool(s: &str) -> BoostResult<bool> {
    match s.trim() {
        "1" | "y" | "Y" | "true" | "on" => Ok(true),
        "0" | "n" | "N" | "false" | "off" => Ok(false),
        other => Err(BoostError::invalid(format!("invalid boolean {other:?}"))),
    }
}

/// Runtime-tunable boost configuration.
#[derive(Debug)]
pub struct Tunables {
    topology: Arc<ClusterTopology>,
    records: Arc<SyncTable>,
    /// Per-cluster: wake this cluster's worker on input.
    wake_cluster: Box<[AtomicBool]>,
    /// OR of all configured frequencies; cheap gate for the input path.
    enabled: AtomicBool,
    window_ms: AtomicU32,
    sched_boost_on_input: AtomicBool,
    /// Serializes writers of `configured_freq` and the derived flags.
    write_lock: Mutex<()>,
}

impl Tunables {
    /// Create a store with boosting disabled and the default window.
    #[must_use]
    pub fn new(topology: Arc<ClusterTopology>, records: Arc<SyncTable>) -> Self {
        let wake_cluster = (0..topology.cluster_count())
            .map(|_| AtomicBool::new(false))
            .collect();
        Self {
            topology,
            records,
            wake_cluster,
            enabled: AtomicBool::new(false),
            window_ms: AtomicU32::new(
                u32::try_from(DEFAULT_BOOST_WINDOW.as_millis()).unwrap_or(u32::MAX),
            ),
            sched_boost_on_input: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }

    /// Check an `input_boost_freq` value without applying it.
    ///
    /// # Errors
    ///
    /// [`BoostError::InvalidArgument`] as for [`Tunables::set_boost_freq`].
    pub fn validate_boost_freq(&self, value: &str) -> BoostResult<()> {
        parse_boost_freq(value, self.records.len()).map(drop)
    }

    /// Apply an `input_boost_freq` value.
    ///
    /// # Errors
    ///
    /// [`BoostError::InvalidArgument`]; the store is unchanged.
    pub fn set_boost_freq(&self, value: &str) -> BoostResult<()> {
        let update = parse_boost_freq(value, self.records.len())?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        match update {
            FreqUpdate::Uniform(khz) => {
                for (_, record) in self.records.iter() {
                    record.set_configured_freq(khz);
                }
                for flag in self.wake_cluster.iter() {
                    flag.store(khz != 0, Ordering::Release);
                }
            }
            FreqUpdate::Pairs(pairs) => {
                for (cpu, khz) in pairs {
                    if let Some(record) = self.records.get(cpu) {
                        record.set_configured_freq(khz);
                    }
                }
                self.propagate_clusters();
            }
        }

        let enabled = self.records.any_configured();
        self.enabled.store(enabled, Ordering::Release);
        info!(freqs = %self.boost_freq().trim_end(), enabled, "Boost frequencies updated");
        Ok(())
    }

    /// Give every member of a cluster the first nonzero member frequency.
    fn propagate_clusters(&self) {
        for (index, cpus) in self.topology.clusters() {
            let shared = cpus
                .iter()
                .map(|&cpu| self.records.configured_freq(cpu))
                .find(|&khz| khz != 0)
                .unwrap_or(0);
            for &cpu in cpus {
                if let Some(record) = self.records.get(cpu) {
                    record.set_configured_freq(shared);
                }
            }
            self.wake_cluster[index].store(shared != 0, Ordering::Release);
            debug!(cluster = index, boost_khz = shared, "Cluster boost frequency");
        }
    }

    /// Boost frequency shared by the members of cluster `index`.
    ///
    /// Read under the writer lock, so a concurrent update is seen either
    /// completely or not at all.
    #[must_use]
    pub fn cluster_freq(&self, index: usize) -> Khz {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.topology
            .cluster_cpus(index)
            .first()
            .map_or(0, |&cpu| self.records.configured_freq(cpu))
    }

    /// Render `input_boost_freq`: `"cpu:value "` per CPU, then a newline.
    #[must_use]
    pub fn boost_freq(&self) -> String {
        let mut out = String::with_capacity(self.records.len() * 12 + 1);
        for (cpu, record) in self.records.iter() {
            let _ = write!(out, "{cpu}:{} ", record.configured_freq());
        }
        out.push('\n');
        out
    }

    /// Set the boost window.
    ///
    /// # Errors
    ///
    /// [`BoostError::InvalidArgument`] below the 50 ms minimum; the
    /// previous window is kept.
    pub fn set_window_ms(&self, ms: u32) -> BoostResult<()> {
        self.validate_window_ms(ms)?;
        self.window_ms.store(ms, Ordering::Release);
        info!(window_ms = ms, "Boost window updated");
        Ok(())
    }

    /// Check a boost window against the minimum without applying it.
    ///
    /// # Errors
    ///
    /// [`BoostError::InvalidArgument`] below the minimum.
    pub fn validate_window_ms(&self, ms: u32) -> BoostResult<()> {
        if ms < MIN_BOOST_WINDOW_MS {
            return Err(BoostError::invalid(format!(
                "boost window {ms}ms is below the {MIN_BOOST_WINDOW_MS}ms minimum"
            )));
        }
        Ok(())
    }

    /// Boost window in milliseconds.
    #[must_use]
    pub fn window_ms(&self) -> u32 {
        self.window_ms.load(Ordering::Acquire)
    }

    /// Boost window as a duration.
    #[inline]
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(u64::from(self.window_ms()))
    }

    /// Enable or disable the scheduler boost during windows.
    pub fn set_sched_boost_on_input(&self, enable: bool) {
        self.sched_boost_on_input.store(enable, Ordering::Release);
        info!(enable, "Scheduler boost on input updated");
    }

    /// Whether windows request the scheduler boost.
    #[must_use]
    pub fn sched_boost_on_input(&self) -> bool {
        self.sched_boost_on_input.load(Ordering::Acquire)
    }

    /// Whether any CPU has a boost frequency configured.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Whether cluster `index` should be woken on input.
    #[inline]
    #[must_use]
    pub fn should_wake(&self, index: usize) -> bool {
        self.wake_cluster
            .get(index)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }
}
