#![doc = "Input-driven CPU frequency boost engine."]

pub mod coordinator;
pub mod enforcer;
pub mod engine;
pub mod expiry;
pub mod input_filter;
pub mod params;
pub mod platform;
pub mod realtime;
pub mod simulated;
pub mod stats;
pub mod sync_record;
pub mod tunables;
pub mod worker;

pub use coordinator::*;
pub use enforcer::FloorEnforcer;
pub use engine::{BoostEngine, ExpireOutcome};
pub use expiry::{ExpiryCounters, ExpiryHandle, ExpiryScheduler};
pub use input_filter::*;
pub use params::Param;
pub use platform::*;
pub use realtime::*;
pub use simulated::*;
pub use stats::*;
pub use sync_record::*;
pub use tunables::*;
pub use worker::{ClusterWorker, WakeResult, WorkerWaker};
