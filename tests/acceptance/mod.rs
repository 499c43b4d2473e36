//! Integration tests for input-boost acceptance testing.

mod common;
mod config_test;
mod scenario_test;
mod timing_test;
