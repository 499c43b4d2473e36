//! Configuration structures for the boost daemon.
//!
//! Supports TOML deserialization with kernel-style defaults
//! (200 ms window, boosting disabled until a frequency is configured).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default boost window.
pub const DEFAULT_BOOST_WINDOW: Duration = Duration::from_millis(200);

/// Shortest boost window accepted from any source.
pub const MIN_BOOST_WINDOW_MS: u32 = 50;

/// Top-level boost configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostConfig {
    /// Initial boost frequency, in the same textual form as the
    /// `input_boost_freq` parameter (`"1300000"` or `"0:1300000 4:800000"`).
    pub input_boost_freq: String,

    /// How long the floor is held after an accepted input event.
    #[serde(with = "humantime_serde")]
    pub input_boost_ms: Duration,

    /// Request the scheduler boost while a window is active.
    pub sched_boost_on_input: bool,

    /// Real-time configuration for the cluster workers.
    pub realtime: RealtimeConfig,

    /// Locations of the kernel interfaces.
    pub sysfs: SysfsConfig,

    /// Control socket configuration.
    pub control: ControlConfig,

    /// Platform used by `--simulated` runs.
    pub simulated: SimulatedConfig,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            input_boost_freq: "0".to_string(),
            input_boost_ms: DEFAULT_BOOST_WINDOW,
            sched_boost_on_input: false,
            realtime: RealtimeConfig::default(),
            sysfs: SysfsConfig::default(),
            control: ControlConfig::default(),
            simulated: SimulatedConfig::default(),
        }
    }
}

/// Real-time scheduling configuration for cluster workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Elevate worker threads (requires CAP_SYS_NICE or root).
    pub enabled: bool,

    /// Scheduler policy: "fifo", "rr" or "other".
    pub policy: SchedPolicy,

    /// Scheduler priority (1-99 for RT policies).
    pub priority: u8,

    /// Pin each worker to the CPUs of its cluster.
    pub pin_workers: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: SchedPolicy::Fifo,
            priority: 99,
            pin_workers: false,
        }
    }
}

/// Scheduler policy for worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedPolicy {
    /// SCHED_FIFO: First-in-first-out real-time.
    #[default]
    Fifo,
    /// SCHED_RR: Round-robin real-time.
    Rr,
    /// SCHED_OTHER: Normal time-sharing (non-RT).
    Other,
}

/// Paths of the kernel interfaces used by the Linux backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SysfsConfig {
    /// Root of the CPU sysfs hierarchy.
    pub cpu_root: PathBuf,
    /// HMP scheduler boost knob. `None` disables scheduler boost requests.
    pub sched_boost_path: Option<PathBuf>,
    /// Directory scanned for evdev nodes.
    pub input_dir: PathBuf,
}

impl Default for SysfsConfig {
    fn default() -> Self {
        Self {
            cpu_root: PathBuf::from("/sys/devices/system/cpu"),
            sched_boost_path: Some(PathBuf::from("/proc/sys/kernel/sched_boost")),
            input_dir: PathBuf::from("/dev/input"),
        }
    }
}

/// Control socket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Serve the get/set protocol.
    pub enabled: bool,
    /// Unix socket path.
    pub socket_path: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket_path: PathBuf::from("/run/input-boost.sock"),
        }
    }
}

/// In-memory platform description for simulated runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// CPU ids of each cluster, in cluster order.
    pub clusters: Vec<Vec<usize>>,
    /// Baseline policy minimum in kHz.
    pub min_khz: u32,
    /// Policy maximum in kHz.
    pub max_khz: u32,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            clusters: vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]],
            min_khz: 300_000,
            max_khz: 2_400_000,
        }
    }
}

impl BoostConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Boost window in whole milliseconds, saturating.
    #[must_use]
    pub fn window_ms(&self) -> u32 {
        u32::try_from(self.input_boost_ms.as_millis()).unwrap_or(u32::MAX)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_ms() < MIN_BOOST_WINDOW_MS {
            return Err(ConfigError::Invalid(format!(
                "input_boost_ms must be at least {MIN_BOOST_WINDOW_MS}ms, got {}",
                humantime::format_duration(self.input_boost_ms)
            )));
        }
        if self.simulated.min_khz > self.simulated.max_khz {
            return Err(ConfigError::Invalid(format!(
                "simulated.min_khz ({}) exceeds simulated.max_khz ({})",
                self.simulated.min_khz, self.simulated.max_khz
            )));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
