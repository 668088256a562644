//! Fuzz target: remote baseline command parser
//!
//! Feeds arbitrary bytes through the same path as an MQTT payload and
//! verifies:
//! - No panics on any input
//! - An accepted explicit baseline is finite and within the sensor range
//! - A rejected command never changes the effective baseline
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensorhub::adapters::nvs::NvsAdapter;
use sensorhub::baseline::{BaselineCommand, BaselineProcessor};
use sensorhub::config::SENSOR_PRESSURE_RANGE_HPA;
use sensorhub::persist::PersistedStore;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };

    if let Ok(BaselineCommand::SetHpa(hpa)) = BaselineCommand::parse(text) {
        let (lo, hi) = SENSOR_PRESSURE_RANGE_HPA;
        assert!(hpa.is_finite() && (lo..=hi).contains(&hpa));
    }

    let Ok(nvs) = NvsAdapter::new() else {
        return;
    };
    let mut store = PersistedStore::new(nvs);
    let mut processor = BaselineProcessor::new(60_000);
    processor.record_reading(100_000.0, 0);
    let before = processor.baseline_pa();
    if processor.handle_text(text, 0, &mut store).is_err() {
        assert_eq!(processor.baseline_pa(), before);
    }
});
