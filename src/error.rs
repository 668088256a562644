//! Unified error types for the sensor hub firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! top-level control loop's error handling uniform. All variants are `Copy`
//! so they can be passed through the service and event sink without
//! allocation.
//!
//! Propagation policy:
//!
//! | Error          | Raised by                 | Handling                              |
//! |----------------|---------------------------|---------------------------------------|
//! | `BusError`     | sensor read               | skip this cycle, retry next interval  |
//! | `AdcError`     | battery read              | skip battery fields this cycle        |
//! | `StorageError` | persisted store           | boot classification fails open        |
//! | `CommandError` | baseline command parser   | reported to the sender, no change     |
//! | `ConfigError`  | startup validation        | fatal, refuses to start               |
//! | `CommsError`   | network adapter           | skip publish, retry next interval     |

use core::fmt;

use serde::Serialize;

pub use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Top-level error of the service layer; every subsystem error converts into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Bus(BusError),
    Adc(AdcError),
    Storage(StorageError),
    Command(CommandError),
    Config(ConfigError),
    Comms(CommsError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Adc(e) => write!(f, "adc: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor bus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The sensor did not acknowledge on the bus.
    NotPresent,
    /// A bus transaction failed or timed out.
    TransferFailed,
    /// The sensor answered with a non-finite or impossible value.
    InvalidReading,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPresent => write!(f, "sensor not present"),
            Self::TransferFailed => write!(f, "bus transfer failed"),
            Self::InvalidReading => write!(f, "invalid reading"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Battery ADC errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcError {
    /// No battery divider is fitted on this board.
    NotFitted,
    /// ADC oneshot read returned an error.
    ReadFailed,
}

impl fmt::Display for AdcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFitted => write!(f, "battery monitor not fitted"),
            Self::ReadFailed => write!(f, "ADC read failed"),
        }
    }
}

impl From<AdcError> for Error {
    fn from(e: AdcError) -> Self {
        Self::Adc(e)
    }
}

// ---------------------------------------------------------------------------
// Remote command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandError {
    /// The command word is not part of the grammar.
    UnknownCommand,
    /// The argument is missing, malformed, or out of range.
    InvalidArgument,
    /// `calibrate` was issued without a fresh pressure reading.
    NoReadingAvailable,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NoReadingAvailable => write!(f, "no fresh pressure reading available"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Startup configuration errors. The `&'static str` names the offending
/// field and the accepted range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A calibration constant would divide by zero or is non-finite.
    InvalidCalibration(&'static str),
    /// A timing or threshold value is out of range.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCalibration(msg) => write!(f, "invalid calibration: {msg}"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    WifiConnectFailed,
    WifiDisconnected,
    PublishFailed,
    PayloadTooLarge,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WifiConnectFailed => write!(f, "WiFi connect failed"),
            Self::WifiDisconnected => write!(f, "WiFi disconnected"),
            Self::PublishFailed => write!(f, "publish failed"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
        }
    }
}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
