//! Sensor hub firmware library.
//!
//! Exposes the pure-logic modules for integration testing and host
//! simulation. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod baseline;
pub mod calibration;
pub mod config;
pub mod error;
pub mod persist;
pub mod resilience;
pub mod scheduler;

/// Milliseconds on a monotonic clock.
pub type Timestamp = u64;
