//! Textual control socket.
//!
//! One command per line, one reply per command:
//!
//! ```text
//! get <param>             -> value
//! set <param> <value...>  -> ok
//! stats                   -> Prometheus text, terminated by "# EOF"
//! inject <event>          -> outcome (touch, power, volume_up, volume_down)
//! ```
//!
//! Failures answer `error: <message>`.

use crate::diagnostics::format_prometheus_metrics;
use boost_core::input_filter::{codes, InputEvent, TriggerOutcome};
use boost_core::params::Param;
use boost_core::CpuBoost;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Read timeout of a connected client, bounding how long `stop` waits for it.
const CLIENT_POLL: Duration = Duration::from_millis(50);

/// Execute one command line against `boost`.
pub fn handle_command(boost: &CpuBoost, line: &str, started: Instant) -> String {
    let line = line.trim();
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim_start();

    match command {
        "get" => match rest.parse::<Param>() {
            Ok(param) => boost.get_param(param).trim_end().to_string(),
            Err(e) => format!("error: {e}"),
        },
        "set" => {
            let (name, value) = rest.split_once(' ').unwrap_or((rest, ""));
            match name.parse::<Param>().and_then(|p| boost.set_param(p, value)) {
                Ok(()) => "ok".to_string(),
                Err(e) => format!("error: {e}"),
            }
        }
        "stats" => {
            let mut text = format_prometheus_metrics(&boost.stats(), started.elapsed());
            text.push_str("# EOF");
            text
        }
        "inject" => {
            let event = match rest {
                "touch" => InputEvent::touch_down(0),
                "power" => InputEvent::key_press(codes::KEY_POWER),
                "volume_up" => InputEvent::key_press(codes::KEY_VOLUMEUP),
                "volume_down" => InputEvent::key_press(codes::KEY_VOLUMEDOWN),
                other => return format!("error: unknown event {other:?}"),
            };
            match boost.handle_input(&event) {
                TriggerOutcome::Boosted { generation, woken } => {
                    format!("boosted generation={generation} woken={woken}")
                }
                other => format!("{other:?}").to_lowercase(),
            }
        }
        "" => "error: empty command".to_string(),
        other => format!("error: unknown command {other:?}"),
    }
}

/// Listener thread serving the control socket.
#[derive(Debug)]
pub struct ControlServer {
    path: PathBuf,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ControlServer {
    /// Bind `path` and start serving. A stale socket file is replaced.
    pub fn start(path: &Path, boost: Arc<CpuBoost>, started: Instant) -> std::io::Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path)?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("input_boost_ctl".to_string())
            .spawn(move || serve(&listener, &boost, &thread_stop, started))?;

        info!(path = %path.display(), "Control socket listening");
        Ok(Self {
            path: path.to_path_buf(),
            stop,
            thread: Some(thread),
        })
    }

    /// Stop serving and remove the socket file.
    ///
    /// The listener blocks in `accept`; a throwaway connection wakes it so
    /// it can observe the stop flag.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        match UnixStream::connect(&self.path) {
            Ok(_) => {
                if thread.join().is_err() {
                    warn!("Control thread panicked");
                }
            }
            // Without a wake-up the thread stays parked in accept; leave it detached.
            Err(e) => warn!(error = %e, "Control listener could not be woken"),
        }
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(listener: &UnixListener, boost: &CpuBoost, stop: &AtomicBool, started: Instant) {
    for stream in listener.incoming() {
        if stop.load(Ordering::Acquire) {
            break;
        }
        match stream {
            Ok(stream) => {
                if let Err(e) = serve_client(stream, boost, stop, started) {
                    debug!(error = %e, "Control client dropped");
                }
            }
            Err(e) => warn!(error = %e, "Control accept failed"),
        }
    }
    debug!("Control listener stopped");
}

fn serve_client(
    stream: UnixStream,
    boost: &CpuBoost,
    stop: &AtomicBool,
    started: Instant,
) -> std::io::Result<()> {
    stream.set_read_timeout(Some(CLIENT_POLL))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    while !stop.load(Ordering::Acquire) {
        match reader.read_line(&mut line) {
            Ok(0) => return Ok(()),
            Ok(_) => {
                let reply = handle_command(boost, &line, started);
                debug!(command = line.trim(), reply = %reply.lines().next().unwrap_or(""), "Control command");
                writeln!(writer, "{reply}")?;
                line.clear();
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
