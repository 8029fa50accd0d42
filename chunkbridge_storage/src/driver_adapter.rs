//! Driver adapters.
//!
//! Driver adapters can be layered on drivers.

pub mod performance_metrics;
