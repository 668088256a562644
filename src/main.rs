//! Sensor hub firmware: main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter   LogEventSink   NvsAdapter   Esp32Time       │
//! │  (SensorPort)      (EventSink)    (Storage)    (uptime / RTC)  │
//! │  NetworkAdapter                   ConfigPortal                 │
//! │  (Connectivity · Publish · Cmd)   (RecoveryPort)               │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  ResetDetector · Scheduler · Baseline · Calibrator     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Boot order matters: the boot is classified before the radio or the
//! sensor bus is touched, so a crash in either still counts against the
//! crash-loop detector.

#![deny(unused_must_use)]

use anyhow::Result;
use log::{error, info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::wifi::EspWifi;

use sensorhub::adapters::device_id;
use sensorhub::adapters::hardware::HardwareAdapter;
use sensorhub::adapters::log_sink::LogEventSink;
use sensorhub::adapters::network::{NetworkAdapter, NetworkSettings};
use sensorhub::adapters::nvs::NvsAdapter;
use sensorhub::adapters::portal::{ConfigPortal, PORTAL_TIMEOUT_MS};
use sensorhub::adapters::power;
use sensorhub::adapters::time::Esp32TimeAdapter;
use sensorhub::app::ports::RecoveryPort;
use sensorhub::app::service::{AppService, StartupDecision};
use sensorhub::config::{BuildOptions, DeviceConfig};
use sensorhub::persist::PersistedStore;

/// Longest the loop sleeps, so inbound commands are handled promptly.
const MAX_IDLE_MS: u64 = 100;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  sensorhub v{}                    ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration (fatal if invalid) ───────────────────
    let board = device_id::detect_board();
    let mac = device_id::read_mac();
    let mut config = DeviceConfig::for_board(board, BuildOptions::default());
    device_id::resolve(&mut config.identity, &mac);
    let mut app = AppService::new(&config)
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    info!(
        "Board: {} | ID: {} | location: {}",
        board.name(),
        config.identity.device_id.as_deref().unwrap_or("?"),
        config.identity.location
    );

    if let Err(e) = power::set_cpu_frequency(config.cpu_freq_mhz) {
        warn!("{}", e);
    }

    // ── 3. Boot classification ────────────────────────────────
    let time = Esp32TimeAdapter::new();
    let nvs = NvsAdapter::new().map_err(|e| {
        error!("NVS unavailable: {}", e);
        anyhow::anyhow!("NVS init failed: {e}")
    })?;
    let mut store = PersistedStore::new(nvs);
    let mut log_sink = LogEventSink::new();

    let decision = app.start(&mut store, time.rtc_ms(), &mut log_sink);

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let wifi = EspWifi::new(peripherals.modem, sysloop, None)?;

    if let StartupDecision::Recovery(reason) = decision {
        let mut portal =
            ConfigPortal::new(wifi, store, device_id::hostname(&mac), PORTAL_TIMEOUT_MS);
        portal.enter_recovery_mode(reason);
    }

    // ── 4. Collaborators ──────────────────────────────────────
    let settings = NetworkSettings::from_env(config.identity.device_id.as_deref().unwrap_or("unknown"));
    let mut net = NetworkAdapter::new(wifi, settings)?;
    let mut hw = HardwareAdapter::new(peripherals.i2c0, &config)?;

    info!("System ready. Entering poll loop.");

    // ── 5. Poll loop ──────────────────────────────────────────
    loop {
        let now = time.uptime_ms();
        app.tick(now, &mut hw, &mut net, &mut store, &mut log_sink);

        let idle = app.next_due_in(time.uptime_ms()).unwrap_or(MAX_IDLE_MS).min(MAX_IDLE_MS);
        FreeRtos::delay_ms(idle.max(1) as u32);
    }
}
