//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the scheduler, boot classifier, baseline processor
//! and calibrator. All I/O flows through port traits injected at call
//! sites, making the whole service testable with mock adapters.
//!
//! ```text
//!  SensorPort ───────▶ ┌──────────────────────────┐ ──▶ EventSink
//!                      │        AppService        │
//!  ConnectivityPort ◀─▶│ Scheduler · ResetDetector│ ──▶ PublishPort
//!  CommandSource ─────▶│ Baseline  · Calibrator   │
//!                      └────────────┬─────────────┘
//!                                   ▼
//!                         PersistedStore<StoragePort>
//! ```

use log::{error, info, warn};

use crate::Timestamp;
use crate::baseline::BaselineProcessor;
use crate::calibration::{CalibratedReading, Calibrator, RawSample};
use crate::config::DeviceConfig;
use crate::error::{ConfigError, Result};
use crate::persist::PersistedStore;
use crate::resilience::{BootOutcome, BootReport, ResetDetector};
use crate::scheduler::{Scheduler, TaskId};

use super::events::{AppEvent, CommandAck, Telemetry};
use super::ports::{CommandSource, ConnectivityPort, EventSink, PublishPort, SensorPort, StoragePort};

/// Upper bound on commands handled per tick, so a chatty broker cannot
/// starve the scheduled tasks.
const MAX_COMMANDS_PER_TICK: usize = 8;

/// What the caller must do after [`AppService::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupDecision {
    /// Enter the normal poll loop.
    Run,
    /// Hand control to the recovery portal; do not start sensing.
    Recovery(BootOutcome),
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService {
    config: DeviceConfig,
    calibrator: Calibrator,
    scheduler: Scheduler,
    detector: ResetDetector,
    baseline: BaselineProcessor,
    boot: Option<BootReport>,
    last_reading: Option<CalibratedReading>,
    /// Last observed link state; `None` before the first check.
    link_up: Option<bool>,
    reads_ok: u32,
    reads_failed: u32,
}

impl AppService {
    /// Validate the configuration and build every component.
    ///
    /// Does **not** touch storage; call [`start`](Self::start) next.
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        let calibrator = Calibrator::new(config)?;
        let scheduler = Scheduler::from_timing(&config.timing)
            .map_err(|_| ConfigError::ValidationFailed("task intervals must be > 0"))?;
        let max_reading_age_ms = 2 * u64::from(config.timing.sensor_read_interval_ms);

        Ok(Self {
            config: config.clone(),
            calibrator,
            scheduler,
            detector: ResetDetector::new(config.resilience),
            baseline: BaselineProcessor::new(max_reading_age_ms),
            boot: None,
            last_reading: None,
            link_up: None,
            reads_ok: 0,
            reads_failed: 0,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Classify this boot and restore the baseline.
    ///
    /// `rtc_now` must come from a clock that survives a warm reset.
    pub fn start(
        &mut self,
        store: &mut PersistedStore<impl StoragePort>,
        rtc_now: Timestamp,
        sink: &mut impl EventSink,
    ) -> StartupDecision {
        let report = self.detector.classify_boot(store, rtc_now);
        self.boot = Some(report);
        sink.emit(&AppEvent::BootClassified(report));

        if report.outcome.requires_recovery() {
            warn!("AppService: {:?}, handing over to recovery", report.outcome);
            return StartupDecision::Recovery(report.outcome);
        }

        let max_age = 2 * u64::from(self.config.timing.sensor_read_interval_ms);
        self.baseline = BaselineProcessor::load(store, self.config.default_baseline_pa, max_age);
        info!("AppService started (degraded={})", report.degraded);
        StartupDecision::Run
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run every due task, then drain inbound commands.
    ///
    /// `now` is monotonic uptime. The `net` parameter satisfies all three
    /// network ports, which avoids a triple mutable borrow of one adapter.
    pub fn tick(
        &mut self,
        now: Timestamp,
        hw: &mut impl SensorPort,
        net: &mut (impl ConnectivityPort + PublishPort + CommandSource),
        store: &mut PersistedStore<impl StoragePort>,
        sink: &mut impl EventSink,
    ) {
        for task in self.scheduler.tick(now) {
            match task {
                TaskId::ConnectivityCheck => self.check_connectivity(net, sink),
                TaskId::SensorRead => self.read_sensors(now, hw, net, sink),
                TaskId::StoreFlush => {
                    if let Err(e) = store.flush() {
                        error!("AppService: store flush failed: {}", e);
                    }
                }
            }
        }

        self.drain_commands(now, net, store, sink);

        match self.detector.poll_confirmation(store, now, self.reads_ok > 0) {
            Ok(true) => sink.emit(&AppEvent::BootConfirmed { uptime_ms: now }),
            Ok(false) => {}
            Err(e) => error!("AppService: boot confirmation failed: {}", e),
        }
        if let Err(e) = self.detector.poll_burst_expiry(store, now) {
            error!("AppService: reset window expiry failed: {}", e);
        }
    }

    /// Milliseconds the caller may idle before the next task is due.
    pub fn next_due_in(&self, now: Timestamp) -> Option<u64> {
        self.scheduler.next_due_in(now)
    }

    // ── Tasks ─────────────────────────────────────────────────

    fn check_connectivity(
        &mut self,
        net: &mut impl ConnectivityPort,
        sink: &mut impl EventSink,
    ) {
        if net.is_connected() {
            if self.link_up == Some(false) {
                sink.emit(&AppEvent::ConnectivityRestored);
            }
            self.link_up = Some(true);
            return;
        }

        if self.link_up == Some(true) {
            sink.emit(&AppEvent::ConnectivityLost);
        }
        self.link_up = Some(false);

        match net.reconnect() {
            Ok(()) if net.is_connected() => {
                info!("AppService: link re-established");
                sink.emit(&AppEvent::ConnectivityRestored);
                self.link_up = Some(true);
            }
            Ok(()) => {}
            Err(e) => warn!("AppService: reconnect failed: {}", e),
        }
    }

    fn read_sensors(
        &mut self,
        now: Timestamp,
        hw: &mut impl SensorPort,
        net: &mut (impl ConnectivityPort + PublishPort),
        sink: &mut impl EventSink,
    ) {
        let raw = match hw.read_raw_sample().and_then(RawSample::validate) {
            Ok(raw) => raw,
            Err(e) => {
                self.reads_failed += 1;
                warn!("AppService: sensor read failed: {}", e);
                sink.emit(&AppEvent::SensorFailed(e));
                return;
            }
        };
        self.baseline.record_reading(raw.pressure_pa, now);

        let battery_adc = if self.calibrator.has_battery() {
            match hw.read_battery_adc() {
                Ok(adc) => Some(adc),
                Err(e) => {
                    sink.emit(&AppEvent::BatteryUnavailable(e));
                    None
                }
            }
        } else {
            None
        };

        let reading = self.calibrator.apply(&raw, self.baseline.baseline_pa(), battery_adc);
        self.last_reading = Some(reading);
        self.reads_ok += 1;
        sink.emit(&AppEvent::Reading(reading));

        if !net.is_connected() {
            return;
        }
        let telemetry = self.build_telemetry(&reading, now);
        if let Err(e) = net.publish(&telemetry) {
            warn!("AppService: publish failed: {}", e);
            sink.emit(&AppEvent::PublishFailed(e));
        }
    }

    fn drain_commands(
        &mut self,
        now: Timestamp,
        net: &mut (impl PublishPort + CommandSource),
        store: &mut PersistedStore<impl StoragePort>,
        sink: &mut impl EventSink,
    ) {
        for _ in 0..MAX_COMMANDS_PER_TICK {
            let Some(text) = net.poll_command() else {
                break;
            };
            let result = self.baseline.handle_text(&text, now, store);
            match &result {
                Ok(action) => sink.emit(&AppEvent::BaselineChanged(*action)),
                Err(e) => {
                    warn!("AppService: command '{}' rejected: {}", text, e);
                    sink.emit(&AppEvent::CommandRejected(*e));
                }
            }
            if let Err(e) = net.acknowledge(&CommandAck::new(&text, &result)) {
                warn!("AppService: acknowledge failed: {}", e);
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Telemetry payload for `reading`, stamped with identity and boot state.
    pub fn build_telemetry(&self, reading: &CalibratedReading, now: Timestamp) -> Telemetry {
        let identity = &self.config.identity;
        let mut t = Telemetry::from_reading(reading);
        t.device_id = identity.device_id.clone().unwrap_or_default();
        t.location = identity.location.clone();
        t.board = self.config.board.name();
        t.firmware = identity.firmware_version.clone();
        t.uptime_ms = now;
        if let Some(boot) = &self.boot {
            t.crash_count = boot.crash_count;
            t.degraded = boot.degraded;
        }
        t
    }

    pub fn boot_report(&self) -> Option<&BootReport> {
        self.boot.as_ref()
    }

    pub fn is_boot_confirmed(&self) -> bool {
        self.detector.is_confirmed()
    }

    /// Effective baseline (Pa); `None` while tracking is disabled.
    pub fn baseline_pa(&self) -> Option<f32> {
        self.baseline.baseline_pa()
    }

    pub fn last_reading(&self) -> Option<&CalibratedReading> {
        self.last_reading.as_ref()
    }

    /// Successful and failed sensor reads since boot.
    pub fn read_counts(&self) -> (u32, u32) {
        (self.reads_ok, self.reads_failed)
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }
}
