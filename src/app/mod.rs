//! Application core: pure domain logic, zero I/O.
//!
//! Boot classification, baseline commands, calibration and scheduling are
//! orchestrated by [`service::AppService`]. All interaction with hardware
//! and the network happens through the **port traits** in [`ports`], so
//! this layer runs unchanged on the host under test.

pub mod events;
pub mod ports;
pub mod service;
