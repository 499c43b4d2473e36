//! Acceptance tests for input-boost.
//!
//! These tests drive a full `CpuBoost` engine over the simulated platform:
//! - Boost scenarios across clusters
//! - Debounce, retrigger and expiry timing
//! - Configuration updates while running
//! - Concurrent input delivery

mod acceptance;
