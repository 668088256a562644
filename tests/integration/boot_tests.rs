//! Boot classification across simulated reboots.
//!
//! A "reboot" drops the `AppService` and the `PersistedStore` facade and
//! carries only the `MockNvs` backend into the next boot, as flash would.

use super::mock_hw::{MockNet, MockNvs, MockSensor, RecordingSink};

use sensorhub::app::events::AppEvent;
use sensorhub::app::service::{AppService, StartupDecision};
use sensorhub::config::{BoardVariant, BuildOptions, DeviceConfig};
use sensorhub::adapters::portal::ConfigPortal;
use sensorhub::persist::{BootMarker, CrashCounter, PersistedStore, ResetBurst};
use sensorhub::resilience::BootOutcome;

fn config() -> DeviceConfig {
    DeviceConfig::for_board(BoardVariant::Esp32, BuildOptions::default())
}

struct Booted {
    app: AppService,
    store: PersistedStore<MockNvs>,
    sink: RecordingSink,
    decision: StartupDecision,
}

fn boot(nvs: MockNvs, rtc_ms: u64) -> Booted {
    let mut app = AppService::new(&config()).expect("default config is valid");
    let mut store = PersistedStore::new(nvs);
    let mut sink = RecordingSink::new();
    let decision = app.start(&mut store, rtc_ms, &mut sink);
    Booted {
        app,
        store,
        sink,
        decision,
    }
}

/// Boot, then crash before anything confirms.
fn crash(nvs: MockNvs, rtc_ms: u64) -> (StartupDecision, MockNvs) {
    let b = boot(nvs, rtc_ms);
    (b.decision, b.store.into_inner())
}

/// Boot, run one sensor read so the boot confirms, then reset. A boot
/// that lands in recovery never reaches the poll loop.
fn healthy(nvs: MockNvs, rtc_ms: u64) -> (StartupDecision, MockNvs) {
    let mut b = boot(nvs, rtc_ms);
    if b.decision == StartupDecision::Run {
        let mut hw = MockSensor::new();
        let mut net = MockNet::offline();
        b.app.tick(0, &mut hw, &mut net, &mut b.store, &mut b.sink);
        assert!(b.app.is_boot_confirmed());
    }
    (b.decision, b.store.into_inner())
}

/// Boot and keep running until `uptime_ms`, then reset.
fn long_run(nvs: MockNvs, rtc_ms: u64, uptime_ms: u64) -> (StartupDecision, MockNvs) {
    let mut b = boot(nvs, rtc_ms);
    if b.decision == StartupDecision::Run {
        let mut hw = MockSensor::new();
        let mut net = MockNet::offline();
        b.app.tick(0, &mut hw, &mut net, &mut b.store, &mut b.sink);
        b.app.tick(uptime_ms, &mut hw, &mut net, &mut b.store, &mut b.sink);
    }
    (b.decision, b.store.into_inner())
}

// ── Reset burst ──────────────────────────────────────────────

#[test]
fn three_quick_resets_open_the_portal() {
    let (d1, nvs) = healthy(MockNvs::new(), 0);
    let (d2, nvs) = healthy(nvs, 500);
    let (d3, _) = healthy(nvs, 1_500);

    assert_eq!(d1, StartupDecision::Run);
    assert_eq!(d2, StartupDecision::Run);
    assert_eq!(d3, StartupDecision::Recovery(BootOutcome::ManualResetBurst));
}

#[test]
fn spaced_resets_stay_normal() {
    let mut nvs = MockNvs::new();
    for t in [0, 5_000, 10_000] {
        let (d, next) = healthy(nvs, t);
        assert_eq!(d, StartupDecision::Run, "boot at t={t}");
        nvs = next;
    }
}

#[test]
fn burst_resets_after_tripping() {
    let (_, nvs) = healthy(MockNvs::new(), 0);
    let (_, nvs) = healthy(nvs, 500);
    let (d, nvs) = crash(nvs, 1_000);
    assert_eq!(d, StartupDecision::Recovery(BootOutcome::ManualResetBurst));

    // The portal restarts the device; that boot starts a fresh window.
    let (d, _) = healthy(nvs, 1_200);
    assert_eq!(d, StartupDecision::Run);
}

#[test]
fn power_cycles_days_apart_stay_normal() {
    // The RTC restarts near zero on every cold boot.
    let mut nvs = MockNvs::new();
    for day in 1..=4 {
        let (d, next) = long_run(nvs, 300, 86_400_000);
        assert_eq!(d, StartupDecision::Run, "power cycle {day}");
        nvs = next;
    }
    let b = boot(nvs, 300);
    assert_eq!(b.decision, StartupDecision::Run);
    assert_eq!(b.app.boot_report().expect("classified").reset_burst_count, 1);
}

#[test]
fn window_is_kept_until_uptime_passes_it() {
    let (_, nvs) = long_run(MockNvs::new(), 300, 1_999);
    let store = PersistedStore::new(nvs);
    assert_eq!(store.get::<ResetBurst>().count, 1);

    let (_, nvs) = long_run(store.into_inner(), 300, 2_000);
    assert_eq!(PersistedStore::new(nvs).get::<ResetBurst>(), ResetBurst::default());
}

// ── Crash loop ───────────────────────────────────────────────

#[test]
fn fifth_unconfirmed_boot_is_a_crash_loop() {
    let mut nvs = MockNvs::new();
    for i in 0..4u64 {
        let (d, next) = crash(nvs, i * 10_000);
        assert_eq!(d, StartupDecision::Run, "boot {}", i + 1);
        nvs = next;
    }
    let (d, _) = crash(nvs, 40_000);
    assert_eq!(d, StartupDecision::Recovery(BootOutcome::CrashLoop));
}

#[test]
fn crash_loop_holds_until_the_portal_rearms() {
    let mut nvs = MockNvs::new();
    for i in 0..5u64 {
        nvs = crash(nvs, i * 10_000).1;
    }
    // Still crashing: every further boot goes straight back to recovery.
    let (d, nvs) = crash(nvs, 50_000);
    assert_eq!(d, StartupDecision::Recovery(BootOutcome::CrashLoop));
    let (d, nvs) = crash(nvs, 60_000);
    assert_eq!(d, StartupDecision::Recovery(BootOutcome::CrashLoop));

    let name = heapless::String::try_from("sensorhub-test").expect("fits");
    let mut portal = ConfigPortal::new(PersistedStore::new(nvs), name, 1_000);
    portal.rearm();
    let store = portal.into_store();
    assert_eq!(store.get::<CrashCounter>().count, 0);

    let (d, _) = healthy(store.into_inner(), 70_000);
    assert_eq!(d, StartupDecision::Run);
}

#[test]
fn confirmation_resets_the_crash_count() {
    let mut nvs = MockNvs::new();
    for i in 0..3u64 {
        nvs = crash(nvs, i * 10_000).1;
    }
    // Fourth boot survives long enough to confirm.
    let (d, nvs) = healthy(nvs, 30_000);
    assert_eq!(d, StartupDecision::Run);

    let b = boot(nvs, 40_000);
    assert_eq!(b.decision, StartupDecision::Run);
    let report = b.app.boot_report().expect("classified");
    assert_eq!(report.crash_count, 0);
    assert!(!report.degraded);
}

#[test]
fn degraded_boot_is_reported_in_telemetry() {
    let nvs = crash(MockNvs::new(), 0).1;
    let nvs = crash(nvs, 10_000).1;

    let mut b = boot(nvs, 20_000);
    let report = *b.app.boot_report().expect("classified");
    assert_eq!(report.crash_count, 2);
    assert!(report.degraded);

    let mut hw = MockSensor::new();
    let mut net = MockNet::online();
    b.app.tick(0, &mut hw, &mut net, &mut b.store, &mut b.sink);
    let t = net.telemetry.last().expect("published");
    assert_eq!(t.crash_count, 2);
    assert!(t.degraded);
}

// ── Marker bookkeeping ───────────────────────────────────────

#[test]
fn marker_is_set_at_classification_and_cleared_on_confirm() {
    let mut b = boot(MockNvs::new(), 0);
    assert!(b.store.get::<BootMarker>().present);

    let mut hw = MockSensor::new();
    let mut net = MockNet::offline();
    b.app.tick(0, &mut hw, &mut net, &mut b.store, &mut b.sink);

    assert!(!b.store.get::<BootMarker>().present);
    assert_eq!(b.store.get::<CrashCounter>().count, 0);
    assert_eq!(
        b.sink.count(|e| matches!(e, AppEvent::BootConfirmed { .. })),
        1
    );
}

#[test]
fn failed_reads_do_not_confirm() {
    let mut b = boot(MockNvs::new(), 0);
    let mut hw = MockSensor::new();
    hw.sample = Err(sensorhub::error::BusError::NotPresent);
    let mut net = MockNet::offline();

    b.app.tick(0, &mut hw, &mut net, &mut b.store, &mut b.sink);
    assert!(!b.app.is_boot_confirmed());
    assert!(b.store.get::<BootMarker>().present);
}

#[test]
fn storage_failure_fails_open() {
    let nvs = MockNvs::new();
    nvs.fail_reads.set(true);
    nvs.fail_writes.set(true);

    let b = boot(nvs, 0);
    assert_eq!(b.decision, StartupDecision::Run);
    let report = b.app.boot_report().expect("classified");
    assert_eq!(report.outcome, BootOutcome::Normal);
    assert!(report.storage_fault);
}

#[test]
fn corrupted_marker_fails_open() {
    let mut nvs = MockNvs::new();
    nvs.put_raw(sensorhub::persist::NAMESPACE, "boot_marker", &[0xDE, 0xAD, 0xBE, 0xEF]);

    let b = boot(nvs, 0);
    assert_eq!(b.decision, StartupDecision::Run);
    assert!(b.app.boot_report().expect("classified").storage_fault);
}
