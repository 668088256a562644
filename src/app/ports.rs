//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (sensor bus, flash, network, recovery portal, event
//! sinks) implement these traits. The [`AppService`](super::service::AppService)
//! consumes them via generics, so the domain core never touches hardware
//! directly.
//!
//! All port errors are typed and `Copy`; callers handle every variant.

use crate::calibration::RawSample;
use crate::error::{AdcError, BusError, CommsError};
use crate::resilience::BootOutcome;

use super::events::{CommandAck, CommandText, Telemetry};

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: the domain calls this to obtain sensor data.
pub trait SensorPort {
    /// One BME280 forced-mode measurement in native units.
    fn read_raw_sample(&mut self) -> Result<RawSample, BusError>;

    /// Raw 12-bit count from the battery divider.
    fn read_battery_adc(&mut self) -> Result<u16, AdcError> {
        Err(AdcError::NotFitted)
    }
}

// ───────────────────────────────────────────────────────────────
// Network ports (driven adapter: domain ↔ WiFi / MQTT)
// ───────────────────────────────────────────────────────────────

/// Link supervision. Association details live in the adapter.
pub trait ConnectivityPort {
    fn is_connected(&self) -> bool;

    /// Start (or restart) association. Must not block longer than the
    /// adapter's configured timeout.
    fn reconnect(&mut self) -> Result<(), CommsError>;
}

/// Outbound telemetry and command acknowledgements.
pub trait PublishPort {
    fn publish(&mut self, telemetry: &Telemetry) -> Result<(), CommsError>;

    /// Report the result of a remote command back to its sender.
    fn acknowledge(&mut self, ack: &CommandAck) -> Result<(), CommsError>;
}

/// Inbound remote commands, polled once per loop iteration.
pub trait CommandSource {
    fn poll_command(&mut self) -> Option<CommandText>;
}

// ───────────────────────────────────────────────────────────────
// Recovery port (driven adapter: domain → configuration portal)
// ───────────────────────────────────────────────────────────────

/// Hands control to the configuration portal. Never returns; the portal
/// restarts the device when the user is done.
pub trait RecoveryPort {
    fn enter_recovery_mode(&mut self, reason: BootOutcome) -> !;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value blob storage.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic per key: after a power loss a key
///   holds either the old or the new value, never a mix. ESP-IDF NVS
///   guarantees this natively.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StoragePort`] operations and record decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Stored bytes failed the version or checksum check.
    Corrupted,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "record corrupted"),
        }
    }
}
