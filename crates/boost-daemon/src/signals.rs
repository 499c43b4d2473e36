//! Signal handling for the daemon.
//!
//! SIGTERM and SIGINT request a graceful shutdown, SIGHUP a configuration
//! reload. Handlers only store into static atomics; the main loop polls them.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);
static RELOAD_FLAG: AtomicBool = AtomicBool::new(false);
static SIGNAL_COUNT: AtomicU32 = AtomicU32::new(0);

/// Handle to the process-wide signal flags.
#[derive(Debug, Clone, Copy)]
pub struct SignalHandler {
    _installed: (),
}

impl SignalHandler {
    /// Register handlers for SIGTERM, SIGINT and SIGHUP.
    pub fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        register_unix_handlers()?;
        Ok(Self { _installed: () })
    }

    /// Whether shutdown was requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        SHUTDOWN_FLAG.load(Ordering::Acquire)
    }

    /// Whether a reload was requested; clears the request.
    #[inline]
    pub fn take_reload_request(&self) -> bool {
        RELOAD_FLAG.swap(false, Ordering::AcqRel)
    }

    /// Request shutdown from inside the process.
    pub fn request_shutdown(&self) {
        info!("Manual shutdown requested");
        SHUTDOWN_FLAG.store(true, Ordering::Release);
    }

    /// Signals received so far.
    pub fn signal_count(&self) -> u32 {
        SIGNAL_COUNT.load(Ordering::Relaxed)
    }

    /// Sleep until a shutdown or reload is pending, or `timeout` passes.
    ///
    /// Returns `true` if something is pending.
    pub fn wait(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let poll_interval = Duration::from_millis(50);
        loop {
            if self.shutdown_requested() || RELOAD_FLAG.load(Ordering::Acquire) {
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return false;
            }
            std::thread::sleep(poll_interval.min(timeout - elapsed));
        }
    }
}

#[cfg(unix)]
fn register_unix_handlers() -> std::io::Result<()> {
    use std::os::raw::c_int;

    extern "C" fn shutdown_handler(_: c_int) {
        SIGNAL_COUNT.fetch_add(1, Ordering::Relaxed);
        SHUTDOWN_FLAG.store(true, Ordering::Release);
    }

    extern "C" fn reload_handler(_: c_int) {
        SIGNAL_COUNT.fetch_add(1, Ordering::Relaxed);
        RELOAD_FLAG.store(true, Ordering::Release);
    }

    let handlers: [(c_int, extern "C" fn(c_int)); 3] = [
        (libc::SIGTERM, shutdown_handler),
        (libc::SIGINT, shutdown_handler),
        (libc::SIGHUP, reload_handler),
    ];
    for (signal, handler) in handlers {
        // SAFETY: the handlers only touch static atomics, which is async-signal-safe.
        let previous = unsafe { libc::signal(signal, handler as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }

    debug!("Unix signal handlers registered");
    Ok(())
}
