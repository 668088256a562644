//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one structured line per application
//! event to the ESP-IDF logger (UART / USB-CDC in production).

use log::{Level, error, info, log, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::calibration::pa_to_hpa;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::BootClassified(r) => {
                let level = if r.outcome.requires_recovery() || r.storage_fault {
                    Level::Warn
                } else {
                    Level::Info
                };
                log!(
                    level,
                    "BOOT | {:?} | crashes={} resets={} | degraded={} storage_fault={}",
                    r.outcome,
                    r.crash_count,
                    r.reset_burst_count,
                    r.degraded,
                    r.storage_fault
                );
            }
            AppEvent::BootConfirmed { uptime_ms } => {
                info!("BOOT | confirmed after {}ms", uptime_ms);
            }
            AppEvent::Reading(r) => {
                info!(
                    "READ | T={:.1}\u{00b0}C | RH={:.1}% | P={:.2}hPa rel={:.2}hPa | alt={:.0}m | bat={}",
                    r.temperature_c,
                    r.humidity_pct,
                    pa_to_hpa(r.pressure_pa),
                    pa_to_hpa(r.relative_pressure_pa),
                    r.altitude_m,
                    match r.battery {
                        Some(b) => format!("{:.2}V/{:.0}%", b.voltage, b.percent),
                        None => "n/a".into(),
                    },
                );
            }
            AppEvent::SensorFailed(e) => warn!("READ | failed: {}", e),
            AppEvent::BatteryUnavailable(e) => warn!("READ | battery skipped: {}", e),
            AppEvent::BaselineChanged(a) => {
                info!("BASELINE | {:?} -> {:?} hPa", a.source, a.baseline_pa.map(pa_to_hpa));
            }
            AppEvent::CommandRejected(e) => warn!("BASELINE | command rejected: {}", e),
            AppEvent::ConnectivityLost => warn!("NET | link lost"),
            AppEvent::ConnectivityRestored => info!("NET | link restored"),
            AppEvent::PublishFailed(e) => error!("NET | publish failed: {}", e),
        }
    }
}
