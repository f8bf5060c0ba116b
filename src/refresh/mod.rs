//! Keeping cached rules and cooldown state in step with the store.
//!
//! Provides two mechanisms:
//! 1. **Event-driven invalidation** (InvalidationService): applies rule write events
//! 2. **Scheduled maintenance** (MaintenanceScheduler): periodic background eviction

pub mod scheduler;
pub mod service;

pub use scheduler::{MaintenanceScheduler, MaintenanceStats};
pub use service::{InvalidationService, InvalidationStats};
