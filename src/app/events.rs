//! Outbound application events and network payloads.
//!
//! The [`AppService`](super::service::AppService) emits [`AppEvent`]s
//! through the [`EventSink`](super::ports::EventSink) port and hands
//! [`Telemetry`] / [`CommandAck`] to the
//! [`PublishPort`](super::ports::PublishPort). Adapters decide the wire
//! format; both payloads derive `Serialize`.

use serde::Serialize;

use crate::baseline::BaselineAction;
use crate::calibration::{CalibratedReading, pa_to_hpa};
use crate::error::{AdcError, BusError, CommandError, CommsError};
use crate::resilience::BootReport;

/// Raw inbound command text.
pub type CommandText = heapless::String<64>;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Boot classified before the main loop starts.
    BootClassified(BootReport),

    /// The running boot proved healthy; the crash marker is cleared.
    BootConfirmed { uptime_ms: u64 },

    /// A calibrated reading from a scheduled sensor read.
    Reading(CalibratedReading),

    /// The scheduled read failed; retried next interval.
    SensorFailed(BusError),

    /// Battery fields are skipped for this reading.
    BatteryUnavailable(AdcError),

    /// A remote command changed the baseline.
    BaselineChanged(BaselineAction),

    /// A remote command was refused; nothing changed.
    CommandRejected(CommandError),

    ConnectivityLost,
    ConnectivityRestored,

    PublishFailed(CommsError),
}

/// Payload published after every successful sensor read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Telemetry {
    pub device_id: heapless::String<24>,
    pub location: heapless::String<32>,
    pub board: &'static str,
    pub firmware: heapless::String<16>,
    pub uptime_ms: u64,
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: f32,
    /// Only present while baseline tracking is enabled.
    pub relative_pressure_hpa: Option<f32>,
    pub baseline_hpa: Option<f32>,
    pub altitude_m: f32,
    pub battery_v: Option<f32>,
    pub battery_pct: Option<f32>,
    pub crash_count: u32,
    pub degraded: bool,
}

impl Telemetry {
    /// Copy the measured fields of `reading`; identity and boot fields are
    /// left at their defaults for the caller to fill in.
    pub fn from_reading(reading: &CalibratedReading) -> Self {
        Self {
            device_id: heapless::String::new(),
            location: heapless::String::new(),
            board: "",
            firmware: heapless::String::new(),
            uptime_ms: 0,
            temperature_c: reading.temperature_c,
            humidity_pct: reading.humidity_pct,
            pressure_hpa: pa_to_hpa(reading.pressure_pa),
            relative_pressure_hpa: reading
                .baseline_pa
                .map(|_| pa_to_hpa(reading.relative_pressure_pa)),
            baseline_hpa: reading.baseline_pa.map(pa_to_hpa),
            altitude_m: reading.altitude_m,
            battery_v: reading.battery.map(|b| b.voltage),
            battery_pct: reading.battery.map(|b| b.percent),
            crash_count: 0,
            degraded: false,
        }
    }
}

/// Result of one remote command, sent back to its origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandAck {
    pub command: CommandText,
    pub accepted: bool,
    /// Effective baseline after the command (hPa).
    pub baseline_hpa: Option<f32>,
    pub error: Option<CommandError>,
}

impl CommandAck {
    pub fn new(command: &str, result: &Result<BaselineAction, CommandError>) -> Self {
        let mut text = CommandText::new();
        // Longer commands are never valid; the prefix is enough to identify them.
        for c in command.trim().chars() {
            if text.push(c).is_err() {
                break;
            }
        }
        match result {
            Ok(action) => Self {
                command: text,
                accepted: true,
                baseline_hpa: action.baseline_pa.map(pa_to_hpa),
                error: None,
            },
            Err(e) => Self {
                command: text,
                accepted: false,
                baseline_hpa: None,
                error: Some(*e),
            },
        }
    }
}
