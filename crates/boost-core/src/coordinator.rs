//! Lifecycle of the boost engine.
//!
//! [`CpuBoost::start`] reads the topology, registers the floor enforcer,
//! starts the expiry thread and one worker per cluster, then applies the
//! initial configuration. Dropping the handle stops every thread and
//! releases any floor still held.

use crate::engine::BoostEngine;
use crate::enforcer::FloorEnforcer;
use crate::expiry::ExpiryScheduler;
use crate::input_filter::{InputEvent, InputFilter, TriggerOutcome};
use crate::params::Param;
use crate::platform::{ClusterTopology, FrequencyGovernor, Khz, SchedulerBoost, TopologySource};
use crate::stats::BoostStats;
use crate::sync_record::SyncTable;
use crate::tunables::Tunables;
use crate::worker::ClusterWorker;
use boost_common::config::BoostConfig;
use boost_common::error::{BoostError, BoostResult};
use boost_common::state::BoostPhase;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Name of the expiry thread.
pub const EXPIRY_THREAD_NAME: &str = "cpuboost_wq";

/// A running boost engine.
pub struct CpuBoost {
    engine: Arc<BoostEngine>,
    filter: Arc<InputFilter>,
    workers: Vec<Option<ClusterWorker>>,
    expiry: ExpiryScheduler,
    stopped: bool,
}

impl std::fmt::Debug for CpuBoost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuBoost")
            .field("engine", &self.engine)
            .field("workers", &self.workers)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl CpuBoost {
    /// Start the engine.
    ///
    /// A worker that cannot be created is logged and its cluster is never
    /// woken; the other clusters still boost.
    ///
    /// # Errors
    ///
    /// [`BoostError::Topology`] if the topology cannot be read,
    /// [`BoostError::Config`] if the initial configuration is rejected, and
    /// [`BoostError::Io`] if the expiry thread cannot be created.
    pub fn start(
        topology: &dyn TopologySource,
        governor: Arc<dyn FrequencyGovernor>,
        sched_boost: Arc<dyn SchedulerBoost>,
        config: &BoostConfig,
    ) -> BoostResult<Self> {
        let topology = Arc::new(topology.cluster_topology().inspect_err(|e| {
            error!(error = %e, "Cannot read cluster topology, input boost disabled");
        })?);
        info!(
            nr_cpus = topology.nr_cpus(),
            clusters = topology.cluster_count(),
            "Starting input boost"
        );

        let records = Arc::new(SyncTable::new(topology.nr_cpus()));
        let tunables = Arc::new(Tunables::new(Arc::clone(&topology), Arc::clone(&records)));
        apply_config(&tunables, config)?;

        governor.register_adjuster(Arc::new(FloorEnforcer::new(Arc::clone(&records))));

        let engine = Arc::new(BoostEngine::new(
            Arc::clone(&topology),
            records,
            tunables,
            governor,
            sched_boost,
        ));

        let expiry_engine = Arc::clone(&engine);
        let expiry = ExpiryScheduler::spawn(EXPIRY_THREAD_NAME, move |generation| {
            expiry_engine.expire(generation);
        })
        .map_err(|e| BoostError::Io(format!("cannot create expiry thread: {e}")))?;

        let workers: Vec<Option<ClusterWorker>> = (0..topology.cluster_count())
            .map(|cluster| {
                ClusterWorker::spawn(Arc::clone(&engine), cluster, config.realtime.clone())
                    .inspect_err(|e| error!(error = %e, "Cluster will not be boosted"))
                    .ok()
            })
            .collect();

        let wakers = workers
            .iter()
            .map(|w| w.as_ref().map(ClusterWorker::waker))
            .collect();
        let filter = Arc::new(InputFilter::new(Arc::clone(&engine), wakers, expiry.handle()));

        info!(
            workers = workers.iter().flatten().count(),
            enabled = engine.tunables.is_enabled(),
            "Input boost running"
        );

        Ok(Self {
            engine,
            filter,
            workers,
            expiry,
            stopped: false,
        })
    }

    /// Filter to hand to input sources.
    pub fn input_filter(&self) -> Arc<InputFilter> {
        Arc::clone(&self.filter)
    }

    /// Feed one input event.
    pub fn handle_input(&self, event: &InputEvent) -> TriggerOutcome {
        self.filter.handle_event(event)
    }

    /// Runtime tunables.
    pub fn tunables(&self) -> &Tunables {
        &self.engine.tunables
    }

    /// Topology the engine was started with.
    pub fn topology(&self) -> &ClusterTopology {
        &self.engine.topology
    }

    /// Re-apply tunables from `config`, e.g. after a reload.
    ///
    /// # Errors
    ///
    /// [`BoostError::Config`] naming the rejected field. Every field is
    /// checked first, so a rejected config changes nothing.
    pub fn reconfigure(&self, config: &BoostConfig) -> BoostResult<()> {
        apply_config(&self.engine.tunables, config)
    }

    /// Apply an `input_boost_freq` value.
    ///
    /// # Errors
    ///
    /// [`BoostError::InvalidArgument`]; nothing changes.
    pub fn set_boost_freq(&self, value: &str) -> BoostResult<()> {
        self.engine.tunables.set_boost_freq(value)
    }

    /// Current `input_boost_freq` rendering.
    pub fn boost_freq(&self) -> String {
        self.engine.tunables.boost_freq()
    }

    /// Set the boost window.
    ///
    /// # Errors
    ///
    /// [`BoostError::InvalidArgument`] below the minimum.
    pub fn set_window_ms(&self, ms: u32) -> BoostResult<()> {
        self.engine.tunables.set_window_ms(ms)
    }

    /// Boost window in milliseconds.
    pub fn window_ms(&self) -> u32 {
        self.engine.tunables.window_ms()
    }

    /// Toggle the scheduler boost during windows.
    pub fn set_sched_boost_on_input(&self, enable: bool) {
        self.engine.tunables.set_sched_boost_on_input(enable);
    }

    /// Read a named parameter.
    pub fn get_param(&self, param: Param) -> String {
        self.engine.tunables.get_param(param)
    }

    /// Write a named parameter.
    ///
    /// # Errors
    ///
    /// [`BoostError::InvalidArgument`]; nothing changes.
    pub fn set_param(&self, param: Param, value: &str) -> BoostResult<()> {
        self.engine.tunables.set_param(param, value)
    }

    /// Floor currently enforced on `cpu`.
    pub fn active_floor(&self, cpu: usize) -> Khz {
        self.engine.records.active_floor(cpu)
    }

    /// Configured boost frequency of `cpu`.
    pub fn configured_freq(&self, cpu: usize) -> Khz {
        self.engine.records.configured_freq(cpu)
    }

    /// Current cycle phase.
    pub fn phase(&self) -> BoostPhase {
        self.engine.phase()
    }

    /// Clusters with a running worker.
    pub fn worker_count(&self) -> usize {
        self.workers.iter().flatten().count()
    }

    /// Activity snapshot.
    pub fn stats(&self) -> BoostStats {
        let mut stats = BoostStats::from_counters(&self.engine.counters);
        let cycle_generation = self.engine.generation();
        stats.phase = self.engine.phase();
        stats.generation = cycle_generation;
        stats.wake_latency = self
            .workers
            .iter()
            .map(|w| w.as_ref().map(ClusterWorker::latency))
            .collect();
        stats
    }

    /// Stop all threads and release floors. Idempotent.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        for worker in self.workers.iter_mut().flatten() {
            worker.stop();
        }
        self.expiry.shutdown();
        self.engine.reset_all();
        info!("Input boost stopped");
    }
}

impl Drop for CpuBoost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn apply_config(tunables: &Tunables, config: &BoostConfig) -> BoostResult<()> {
    tunables
        .validate_window_ms(config.window_ms())
        .map_err(|e| BoostError::Config(format!("input_boost_ms: {e}")))?;
    tunables
        .validate_boost_freq(&config.input_boost_freq)
        .map_err(|e| BoostError::Config(format!("input_boost_freq: {e}")))?;

    tunables
        .set_boost_freq(&config.input_boost_freq)
        .map_err(|e| BoostError::Config(format!("input_boost_freq: {e}")))?;
    tunables
        .set_window_ms(config.window_ms())
        .map_err(|e| BoostError::Config(format!("input_boost_ms: {e}")))?;
    tunables.set_sched_boost_on_input(config.sched_boost_on_input);
    if !tunables.is_enabled() {
        warn!("No boost frequency configured, input boost is idle");
    }
    Ok(())
}
