//! Integration tests for the scheduled tick → calibrate → publish pipeline
//! and the remote baseline command path.
//!
//! These run on the host (x86_64) against the mocks in `mock_hw`.

use super::mock_hw::{MockNet, MockNvs, MockSensor, RecordingSink};

use sensorhub::app::events::AppEvent;
use sensorhub::app::service::{AppService, StartupDecision};
use sensorhub::baseline::BaselineSource;
use sensorhub::config::{BoardVariant, BuildOptions, DeviceConfig, SensorAddress};
use sensorhub::error::{AdcError, BusError, CommandError, CommsError};
use sensorhub::persist::{PersistedStore, PressureBaseline};

const READ_MS: u64 = 30_000;
const WIFI_MS: u64 = 15_000;
const FLUSH_MS: u64 = 60_000;

fn options(battery: bool) -> BuildOptions {
    BuildOptions {
        battery_powered: battery,
        battery_on_s3: false,
        sensor_address: SensorAddress::Primary,
    }
}

struct Rig {
    app: AppService,
    hw: MockSensor,
    net: MockNet,
    store: PersistedStore<MockNvs>,
    sink: RecordingSink,
}

impl Rig {
    fn with(config: DeviceConfig, nvs: MockNvs, net: MockNet) -> Self {
        let mut app = AppService::new(&config).expect("valid config");
        let mut store = PersistedStore::new(nvs);
        let mut sink = RecordingSink::new();
        assert_eq!(app.start(&mut store, 0, &mut sink), StartupDecision::Run);
        Self {
            app,
            hw: MockSensor::new(),
            net,
            store,
            sink,
        }
    }

    fn online() -> Self {
        Self::with(
            DeviceConfig::for_board(BoardVariant::Esp32, options(false)),
            MockNvs::new(),
            MockNet::online(),
        )
    }

    fn tick(&mut self, now: u64) {
        self.app
            .tick(now, &mut self.hw, &mut self.net, &mut self.store, &mut self.sink);
    }
}

// ── Scheduled reads and publishing ───────────────────────────

#[test]
fn first_tick_reads_and_publishes() {
    let mut rig = Rig::online();
    rig.tick(0);

    assert_eq!(rig.hw.reads, 1);
    assert_eq!(rig.net.telemetry.len(), 1);
    let t = &rig.net.telemetry[0];
    assert!((t.pressure_hpa - 1000.0).abs() < 0.01);
    assert_eq!(t.relative_pressure_hpa, None);
    assert_eq!(t.board, "esp32");
    assert!(t.device_id.is_empty() || t.device_id.starts_with("ESP-"));
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::Reading(_))), 1);
}

#[test]
fn reads_follow_the_interval() {
    let mut rig = Rig::online();
    rig.tick(0);
    rig.tick(READ_MS - 1);
    assert_eq!(rig.hw.reads, 1);
    rig.tick(READ_MS);
    assert_eq!(rig.hw.reads, 2);
    // A late tick runs the read once, not once per missed interval.
    rig.tick(READ_MS * 5);
    assert_eq!(rig.hw.reads, 3);
}

#[test]
fn offline_reads_are_not_published() {
    let mut rig = Rig::with(
        DeviceConfig::for_board(BoardVariant::Esp32, options(false)),
        MockNvs::new(),
        MockNet::offline(),
    );
    rig.tick(0);
    assert_eq!(rig.hw.reads, 1);
    assert!(rig.net.telemetry.is_empty());
    assert!(rig.app.last_reading().is_some());
}

#[test]
fn sensor_failure_is_reported_and_retried() {
    let mut rig = Rig::online();
    rig.hw.sample = Err(BusError::TransferFailed);
    rig.tick(0);

    assert!(rig.net.telemetry.is_empty());
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::SensorFailed(BusError::TransferFailed))),
        1
    );
    assert_eq!(rig.app.read_counts(), (0, 1));

    rig.hw = MockSensor::new();
    rig.tick(READ_MS);
    assert_eq!(rig.app.read_counts(), (1, 1));
    assert_eq!(rig.net.telemetry.len(), 1);
}

#[test]
fn non_finite_sample_is_rejected() {
    let mut rig = Rig::online();
    rig.hw.set_pressure(f32::NAN);
    rig.tick(0);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::SensorFailed(BusError::InvalidReading))),
        1
    );
}

#[test]
fn publish_failure_is_an_event() {
    let mut rig = Rig::online();
    rig.net.publish_fails = true;
    rig.tick(0);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::PublishFailed(CommsError::PublishFailed))),
        1
    );
}

// ── Battery ──────────────────────────────────────────────────

#[test]
fn battery_fields_present_when_fitted() {
    let mut rig = Rig::with(
        DeviceConfig::for_board(BoardVariant::Esp32, options(true)),
        MockNvs::new(),
        MockNet::online(),
    );
    rig.hw.battery = Ok(2_600);
    rig.tick(0);

    let t = &rig.net.telemetry[0];
    let pct = t.battery_pct.expect("battery percent");
    assert!((0.0..=100.0).contains(&pct));
    assert!(t.battery_v.expect("battery voltage") > 0.0);
}

#[test]
fn battery_read_failure_skips_fields() {
    let mut rig = Rig::with(
        DeviceConfig::for_board(BoardVariant::Esp32, options(true)),
        MockNvs::new(),
        MockNet::online(),
    );
    rig.hw.battery = Err(AdcError::ReadFailed);
    rig.tick(0);

    let t = &rig.net.telemetry[0];
    assert_eq!(t.battery_v, None);
    assert_eq!(t.battery_pct, None);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::BatteryUnavailable(AdcError::ReadFailed))),
        1
    );
}

#[test]
fn boards_without_divider_never_read_the_adc() {
    let mut rig = Rig::with(
        DeviceConfig::for_board(BoardVariant::Esp32S3, options(true)),
        MockNvs::new(),
        MockNet::online(),
    );
    rig.tick(0);
    assert_eq!(rig.net.telemetry[0].battery_pct, None);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::BatteryUnavailable(_))), 0);
}

// ── Connectivity supervision ─────────────────────────────────

#[test]
fn link_loss_and_recovery_are_reported_once() {
    let mut rig = Rig::online();
    rig.tick(0);

    rig.net.connected = false;
    rig.tick(WIFI_MS);
    rig.tick(WIFI_MS * 2);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::ConnectivityLost)), 1);
    assert_eq!(rig.net.reconnect_attempts, 2);

    rig.net.reconnect_ok = true;
    rig.tick(WIFI_MS * 3);
    assert!(rig.net.connected);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::ConnectivityRestored)), 1);
}

#[test]
fn initially_offline_link_is_reconnected() {
    let mut net = MockNet::offline();
    net.reconnect_ok = true;
    let mut rig = Rig::with(
        DeviceConfig::for_board(BoardVariant::Esp32, options(false)),
        MockNvs::new(),
        net,
    );
    rig.tick(0);
    assert!(rig.net.connected);
    // Connectivity is checked before the read, so the first sample goes out.
    assert_eq!(rig.net.telemetry.len(), 1);
}

// ── Remote baseline commands ─────────────────────────────────

#[test]
fn calibrate_captures_the_latest_reading() {
    let mut rig = Rig::online();
    rig.hw.set_pressure(98_765.0);
    rig.tick(0);

    rig.net.push_command("calibrate");
    rig.tick(1_000);

    let ack = rig.net.acks.last().expect("ack");
    assert!(ack.accepted);
    assert!((ack.baseline_hpa.expect("baseline") - 987.65).abs() < 0.01);
    assert_eq!(rig.app.baseline_pa(), Some(98_765.0));

    rig.tick(READ_MS);
    let t = rig.net.telemetry.last().expect("telemetry");
    assert!(t.relative_pressure_hpa.expect("relative").abs() < 0.01);
}

#[test]
fn calibrate_without_a_reading_is_refused() {
    let mut rig = Rig::online();
    rig.hw.sample = Err(BusError::NotPresent);
    rig.tick(0);

    rig.net.push_command("calibrate");
    rig.tick(100);

    let ack = rig.net.acks.last().expect("ack");
    assert!(!ack.accepted);
    assert_eq!(ack.error, Some(CommandError::NoReadingAvailable));
    assert_eq!(rig.app.baseline_pa(), None);
}

#[test]
fn explicit_baseline_is_converted_from_hpa() {
    let mut rig = Rig::online();
    rig.net.push_command("baseline 1013.25");
    rig.tick(0);

    assert_eq!(rig.app.baseline_pa(), Some(101_325.0));
    assert_eq!(
        rig.sink.count(|e| matches!(
            e,
            AppEvent::BaselineChanged(a) if a.source == BaselineSource::Explicit
        )),
        1
    );
}

#[test]
fn malformed_commands_change_nothing() {
    let mut rig = Rig::online();
    rig.net.push_command("baseline 1013.25");
    rig.tick(0);

    for bad in ["baseline abc", "baseline", "baseline 50", "reboot now", "calibrate extra"] {
        rig.net.push_command(bad);
    }
    rig.tick(10);

    assert_eq!(rig.app.baseline_pa(), Some(101_325.0));
    let errors: Vec<_> = rig.net.acks[1..].iter().map(|a| a.error).collect();
    assert_eq!(
        errors,
        vec![
            Some(CommandError::InvalidArgument),
            Some(CommandError::InvalidArgument),
            Some(CommandError::InvalidArgument),
            Some(CommandError::UnknownCommand),
            Some(CommandError::InvalidArgument),
        ]
    );
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::CommandRejected(_))), 5);
}

#[test]
fn clear_disables_relative_pressure() {
    let mut rig = Rig::online();
    rig.net.push_command("baseline 1000");
    rig.tick(0);
    rig.net.push_command("CLEAR_BASELINE");
    rig.tick(10);
    assert_eq!(rig.app.baseline_pa(), None);

    rig.tick(READ_MS);
    let t = rig.net.telemetry.last().expect("telemetry");
    assert_eq!(t.relative_pressure_hpa, None);
    assert_eq!(t.baseline_hpa, None);
}

#[test]
fn zero_baseline_clears_tracking() {
    let mut rig = Rig::online();
    rig.net.push_command("baseline 1000");
    rig.tick(0);
    rig.net.push_command("baseline 0");
    rig.tick(10);

    let ack = rig.net.acks.last().expect("ack");
    assert!(ack.accepted);
    assert_eq!(ack.baseline_hpa, None);
    assert_eq!(rig.app.baseline_pa(), None);
    assert_eq!(
        rig.sink.count(|e| matches!(
            e,
            AppEvent::BaselineChanged(a) if a.source == BaselineSource::Cleared
        )),
        1
    );
}

#[test]
fn commands_per_tick_are_bounded() {
    let mut rig = Rig::online();
    for _ in 0..10 {
        rig.net.push_command("baseline 1000");
    }
    rig.tick(0);
    assert_eq!(rig.net.acks.len(), 8);
    rig.tick(10);
    assert_eq!(rig.net.acks.len(), 10);
}

// ── Baseline persistence ─────────────────────────────────────

#[test]
fn baseline_survives_reboot_after_flush() {
    let mut rig = Rig::online();
    rig.tick(0);
    rig.net.push_command("baseline 1005.5");
    rig.tick(10);
    assert!(rig.store.has_pending());

    rig.tick(FLUSH_MS);
    assert!(!rig.store.has_pending());

    let nvs = rig.store.into_inner();
    let rig = Rig::with(
        DeviceConfig::for_board(BoardVariant::Esp32, options(false)),
        nvs,
        MockNet::online(),
    );
    assert_eq!(rig.app.baseline_pa(), Some(100_550.0));
}

#[test]
fn unflushed_baseline_is_lost_on_reset() {
    let mut rig = Rig::online();
    rig.tick(0);
    rig.net.push_command("baseline 1005.5");
    rig.tick(10);

    let nvs = rig.store.into_inner();
    let rig = Rig::with(
        DeviceConfig::for_board(BoardVariant::Esp32, options(false)),
        nvs,
        MockNet::online(),
    );
    assert_eq!(rig.app.baseline_pa(), None);
}

#[test]
fn stored_clear_overrides_the_configured_default() {
    let mut cfg = DeviceConfig::for_board(BoardVariant::Esp32, options(false));
    cfg.default_baseline_pa = Some(101_000.0);

    let mut store = PersistedStore::new(MockNvs::new());
    store.set_durable(&PressureBaseline(None)).expect("write");
    let rig = Rig::with(cfg.clone(), store.into_inner(), MockNet::online());
    assert_eq!(rig.app.baseline_pa(), None);

    let rig = Rig::with(cfg, MockNvs::new(), MockNet::online());
    assert_eq!(rig.app.baseline_pa(), Some(101_000.0));
}

#[test]
fn failed_flush_keeps_value_pending() {
    let mut rig = Rig::online();
    rig.tick(0);
    rig.net.push_command("baseline 990");
    rig.tick(10);

    rig.store.backend().fail_writes.set(true);
    rig.tick(FLUSH_MS);
    assert!(rig.store.has_pending());

    rig.store.backend().fail_writes.set(false);
    rig.tick(FLUSH_MS * 2);
    assert!(!rig.store.has_pending());
}
