//! One dedicated thread per cluster.
//!
//! A worker parks on a one-slot channel. Waking it is a `try_send`: if a
//! wake is already queued the new one merges into it, so the input path
//! never blocks and a busy cluster is not woken twice for the same burst.

use crate::engine::BoostEngine;
use crate::realtime;
use boost_common::config::RealtimeConfig;
use boost_common::error::{BoostError, BoostResult};
use boost_common::metrics::{LatencyMetrics, LatencySnapshot, DEFAULT_SLOW_WAKE};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, warn};

const LATENCY_SAMPLES: usize = 1024;

enum WorkerMsg {
    Wake(Instant),
    Stop,
}

/// Result of a wake attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeResult {
    /// A new wake was queued.
    Queued,
    /// A wake was already pending; this one merged into it.
    Coalesced,
    /// The worker is gone.
    Stopped,
}

/// Sending side of a worker's wake channel.
#[derive(Clone)]
pub struct WorkerWaker {
    cluster: usize,
    tx: Sender<WorkerMsg>,
}

impl std::fmt::Debug for WorkerWaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerWaker").field("cluster", &self.cluster).finish()
    }
}

impl WorkerWaker {
    /// Wake the worker. Never blocks.
    #[inline]
    pub fn wake(&self, issued_at: Instant) -> WakeResult {
        match self.tx.try_send(WorkerMsg::Wake(issued_at)) {
            Ok(()) => WakeResult::Queued,
            Err(TrySendError::Full(_)) => WakeResult::Coalesced,
            Err(TrySendError::Disconnected(_)) => WakeResult::Stopped,
        }
    }
}

/// A running cluster worker.
pub struct ClusterWorker {
    cluster: usize,
    waker: WorkerWaker,
    latency: Arc<Mutex<LatencyMetrics>>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ClusterWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterWorker")
            .field("cluster", &self.cluster)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl ClusterWorker {
    /// Spawn the worker for `cluster`.
    ///
    /// # Errors
    ///
    /// [`BoostError::WorkerCreate`] if the thread could not be created.
    pub(crate) fn spawn(
        engine: Arc<BoostEngine>,
        cluster: usize,
        rt_config: RealtimeConfig,
    ) -> BoostResult<Self> {
        let (tx, rx) = bounded(1);
        let latency = Arc::new(Mutex::new(LatencyMetrics::new(LATENCY_SAMPLES, DEFAULT_SLOW_WAKE)));
        let thread_latency = Arc::clone(&latency);

        let thread = thread::Builder::new()
            .name(format!("input_boost_task{cluster}"))
            .spawn(move || {
                let cpus = engine.topology.cluster_cpus(cluster).to_vec();
                match realtime::elevate_current_thread(&rt_config, &cpus) {
                    Ok(status) => debug!(cluster, ?status, "Worker started"),
                    Err(e) => warn!(cluster, error = %e, "Worker keeps default scheduling"),
                }
                run(&engine, cluster, &rx, &thread_latency);
            })
            .map_err(|e| BoostError::WorkerCreate {
                cluster,
                reason: e.to_string(),
            })?;

        Ok(Self {
            cluster,
            waker: WorkerWaker { cluster, tx },
            latency,
            thread: Some(thread),
        })
    }

    /// Cluster this worker serves.
    pub fn cluster(&self) -> usize {
        self.cluster
    }

    /// A waker for the input path.
    pub fn waker(&self) -> WorkerWaker {
        self.waker.clone()
    }

    /// Wake-to-effect latency so far.
    pub fn latency(&self) -> LatencySnapshot {
        self.latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Stop and join the thread. A queued wake is served first.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.waker.tx.send(WorkerMsg::Stop);
        if thread.join().is_err() {
            warn!(cluster = self.cluster, "Worker thread panicked");
        }
    }
}

impl Drop for ClusterWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    engine: &BoostEngine,
    cluster: usize,
    rx: &Receiver<WorkerMsg>,
    latency: &Mutex<LatencyMetrics>,
) {
    while let Ok(msg) = rx.recv() {
        let issued_at = match msg {
            WorkerMsg::Wake(at) => at,
            WorkerMsg::Stop => break,
        };
        crate::stats::BoostCounters::bump(&engine.counters.worker_runs);
        if engine.boost_cluster(cluster).is_some() {
            latency
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record(issued_at.elapsed());
        }
    }
    debug!(cluster, "Worker stopped");
}
