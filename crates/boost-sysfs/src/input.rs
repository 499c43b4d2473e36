//! evdev input source.
//!
//! Every `event*` node whose capabilities match a [`DeviceClass`] gets a
//! reader thread that forwards events into the [`InputFilter`]. Readers
//! block in `read(2)`; [`EvdevInputSource::stop`] only takes effect once
//! the next event arrives, so the threads are detached rather than joined.

use boost_common::error::{BoostError, BoostResult};
use boost_core::input_filter::{DeviceCapabilities, DeviceClass, InputEvent, InputFilter};
use evdev::{AbsoluteAxisType, Device, EventType, Key};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// A device the source attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedDevice {
    /// Device node.
    pub path: PathBuf,
    /// Reported device name.
    pub name: String,
    /// Matching class.
    pub class: DeviceClass,
}

/// Capabilities of an open evdev device.
pub fn device_capabilities(dev: &Device) -> DeviceCapabilities {
    let events = dev.supported_events();
    let axes = dev.supported_absolute_axes();
    let has_axis = |axis: AbsoluteAxisType| axes.is_some_and(|set| set.contains(axis));
    DeviceCapabilities {
        ev_abs: events.contains(EventType::ABSOLUTE),
        ev_key: events.contains(EventType::KEY),
        abs_mt_position_x: has_axis(AbsoluteAxisType::ABS_MT_POSITION_X),
        abs_mt_position_y: has_axis(AbsoluteAxisType::ABS_MT_POSITION_Y),
        abs_x: has_axis(AbsoluteAxisType::ABS_X),
        abs_y: has_axis(AbsoluteAxisType::ABS_Y),
        btn_touch: dev
            .supported_keys()
            .is_some_and(|keys| keys.contains(Key::BTN_TOUCH)),
    }
}

/// Reader threads feeding input into a filter.
#[derive(Debug)]
pub struct EvdevInputSource {
    stop: Arc<AtomicBool>,
    devices: Vec<AttachedDevice>,
}

impl EvdevInputSource {
    /// Attach to every matching device under `input_dir`.
    ///
    /// # Errors
    ///
    /// [`BoostError::Io`] if `input_dir` cannot be listed.
    pub fn attach(input_dir: &Path, filter: Arc<InputFilter>) -> BoostResult<Self> {
        let entries = std::fs::read_dir(input_dir)
            .map_err(|e| BoostError::Io(format!("{}: {e}", input_dir.display())))?;

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|s| s.to_str())
                    .is_some_and(|name| name.starts_with("event"))
            })
            .collect();
        paths.sort();

        let stop = Arc::new(AtomicBool::new(false));
        let mut devices = Vec::new();
        for path in paths {
            let dev = match Device::open(&path) {
                Ok(dev) => dev,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Cannot open input device");
                    continue;
                }
            };
            let Some(class) = device_capabilities(&dev).device_class() else {
                continue;
            };
            let attached = AttachedDevice {
                name: dev.name().unwrap_or("unknown").to_string(),
                path: path.clone(),
                class,
            };

            let reader_filter = Arc::clone(&filter);
            let reader_stop = Arc::clone(&stop);
            let spawned = thread::Builder::new()
                .name(format!("input_boost_{}", path.file_name().and_then(|s| s.to_str()).unwrap_or("evdev")))
                .spawn(move || read_events(dev, &reader_filter, &reader_stop));
            match spawned {
                Ok(_) => {
                    info!(device = %attached.name, path = %path.display(), ?class, "Attached input device");
                    devices.push(attached);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Cannot start input reader"),
            }
        }

        if devices.is_empty() {
            warn!(dir = %input_dir.display(), "No matching input devices");
        }
        Ok(Self { stop, devices })
    }

    /// Devices being read.
    pub fn devices(&self) -> &[AttachedDevice] {
        &self.devices
    }

    /// Ask readers to exit after their next event.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

impl Drop for EvdevInputSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_events(mut dev: Device, filter: &InputFilter, stop: &AtomicBool) {
    let name = dev.name().unwrap_or("unknown").to_string();
    while !stop.load(Ordering::Acquire) {
        match dev.fetch_events() {
            Ok(events) => {
                for event in events {
                    filter.handle_event(&InputEvent::new(
                        event.event_type().0,
                        event.code(),
                        event.value(),
                    ));
                }
            }
            Err(e) => {
                warn!(device = %name, error = %e, "Input device gone");
                return;
            }
        }
    }
}
