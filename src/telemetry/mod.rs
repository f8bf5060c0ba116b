//! # Telemetry
//!
//! Lock-free counters describing resolution outcomes and cache behavior.
//! Shared by the cache, the engine and the maintenance task.

pub mod recorder;

pub use recorder::{MetricsRecorder, MetricsSnapshot};
