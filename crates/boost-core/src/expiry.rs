//! Single-slot deadline timer for boost windows.
//!
//! The scheduler thread holds at most one pending deadline. Arming replaces
//! whatever was pending, so a burst of triggers leaves exactly one expiry in
//! flight: the one for the newest cycle.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

enum ExpiryCommand {
    Arm { deadline: Instant, generation: u64 },
    Cancel,
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    deadline: Instant,
    generation: u64,
}

/// Counters maintained by the scheduler thread.
#[derive(Debug, Default)]
pub struct ExpiryCounters {
    replaced: AtomicU64,
    cancelled: AtomicU64,
    fired: AtomicU64,
}

impl ExpiryCounters {
    /// Pending deadlines replaced by a newer arm.
    pub fn replaced(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }

    /// Pending deadlines dropped by an explicit cancel.
    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Deadlines that elapsed and ran the callback.
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}

/// Cheap handle for arming and cancelling the deadline. Never blocks.
#[derive(Clone)]
pub struct ExpiryHandle {
    tx: Sender<ExpiryCommand>,
}

impl std::fmt::Debug for ExpiryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryHandle").finish_non_exhaustive()
    }
}

impl ExpiryHandle {
    /// Fire for `generation` after `delay`, replacing any pending deadline.
    pub fn arm(&self, delay: Duration, generation: u64) {
        let deadline = Instant::now() + delay;
        if self.tx.send(ExpiryCommand::Arm { deadline, generation }).is_err() {
            trace!(generation, "Expiry scheduler gone, arm dropped");
        }
    }

    /// Drop the pending deadline, if any.
    pub fn cancel(&self) {
        let _ = self.tx.send(ExpiryCommand::Cancel);
    }
}

/// Owner of the expiry thread.
pub struct ExpiryScheduler {
    handle: ExpiryHandle,
    counters: Arc<ExpiryCounters>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ExpiryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryScheduler")
            .field("counters", &self.counters)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl ExpiryScheduler {
    /// Spawn the scheduler thread. `on_fire` runs on that thread with the
    /// generation the elapsed deadline was armed for.
    ///
    /// # Errors
    ///
    /// Returns the spawn error if the thread could not be created.
    pub fn spawn<F>(name: &str, mut on_fire: F) -> std::io::Result<Self>
    where
        F: FnMut(u64) + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let counters = Arc::new(ExpiryCounters::default());
        let thread_counters = Arc::clone(&counters);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(&rx, &thread_counters, &mut on_fire))?;

        Ok(Self {
            handle: ExpiryHandle { tx },
            counters,
            thread: Some(thread),
        })
    }

    /// A handle for arming from other threads.
    pub fn handle(&self) -> ExpiryHandle {
        self.handle.clone()
    }

    /// Scheduler counters.
    pub fn counters(&self) -> &ExpiryCounters {
        &self.counters
    }

    /// Stop the thread, discarding any pending deadline.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.handle.tx.send(ExpiryCommand::Shutdown);
        if thread.join().is_err() {
            warn!("Expiry thread panicked");
        }
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(rx: &Receiver<ExpiryCommand>, counters: &ExpiryCounters, on_fire: &mut dyn FnMut(u64)) {
    let mut pending: Option<Pending> = None;
    loop {
        let command = match pending {
            Some(p) => match rx.recv_deadline(p.deadline) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => Some(ExpiryCommand::Shutdown),
            },
            None => Some(rx.recv().unwrap_or(ExpiryCommand::Shutdown)),
        };

        match command {
            None => {
                if let Some(p) = pending.take() {
                    counters.fired.fetch_add(1, Ordering::Relaxed);
                    trace!(generation = p.generation, "Boost window elapsed");
                    on_fire(p.generation);
                }
            }
            Some(ExpiryCommand::Arm { deadline, generation }) => {
                if pending.replace(Pending { deadline, generation }).is_some() {
                    counters.replaced.fetch_add(1, Ordering::Relaxed);
                }
            }
            Some(ExpiryCommand::Cancel) => {
                if pending.take().is_some() {
                    counters.cancelled.fetch_add(1, Ordering::Relaxed);
                }
            }
            Some(ExpiryCommand::Shutdown) => break,
        }
    }
    debug!("Expiry scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording() -> (ExpiryScheduler, Arc<Mutex<Vec<u64>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let scheduler =
            ExpiryScheduler::spawn("expiry-test", move |g| sink.lock().unwrap().push(g)).unwrap();
        (scheduler, fired)
    }

    #[test]
    fn test_fires_after_delay() {
        let (scheduler, fired) = recording();
        let start = Instant::now();
        scheduler.handle().arm(Duration::from_millis(30), 1);
        while fired.lock().unwrap().is_empty() {
            assert!(start.elapsed() < Duration::from_secs(5), "expiry never fired");
            thread::sleep(Duration::from_millis(2));
        }
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(*fired.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_rearm_replaces_pending() {
        let (scheduler, fired) = recording();
        let handle = scheduler.handle();
        handle.arm(Duration::from_millis(40), 1);
        handle.arm(Duration::from_millis(40), 2);
        handle.arm(Duration::from_millis(40), 3);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(*fired.lock().unwrap(), vec![3]);
        assert_eq!(scheduler.counters().replaced(), 2);
        assert_eq!(scheduler.counters().fired(), 1);
    }

    #[test]
    fn test_cancel_prevents_fire() {
        let (scheduler, fired) = recording();
        let handle = scheduler.handle();
        handle.arm(Duration::from_millis(30), 1);
        handle.cancel();
        thread::sleep(Duration::from_millis(100));
        assert!(fired.lock().unwrap().is_empty());
        assert_eq!(scheduler.counters().cancelled(), 1);
    }

    #[test]
    fn test_shutdown_discards_pending() {
        let (mut scheduler, fired) = recording();
        scheduler.handle().arm(Duration::from_secs(10), 7);
        scheduler.shutdown();
        assert!(fired.lock().unwrap().is_empty());
        // Arming after shutdown is harmless.
        scheduler.handle().arm(Duration::from_millis(1), 8);
    }
}
