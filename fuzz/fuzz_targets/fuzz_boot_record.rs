//! Fuzz target: persisted boot records
//!
//! Writes arbitrary bytes into every resilience slot and classifies a
//! boot on top of them, verifying:
//! - No panics under arbitrary flash contents
//! - Classification always completes and always leaves the marker set
//!
//! cargo fuzz run fuzz_boot_record

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensorhub::adapters::nvs::NvsAdapter;
use sensorhub::config::ResilienceConfig;
use sensorhub::persist::{BootMarker, NAMESPACE, PersistedStore};
use sensorhub::resilience::ResetDetector;

fuzz_target!(|data: &[u8]| {
    let Ok(mut nvs) = NvsAdapter::new() else {
        return;
    };
    let (now, rest) = match data.split_first_chunk::<8>() {
        Some((head, rest)) => (u64::from_le_bytes(*head), rest),
        None => (0, data),
    };
    let mut chunks = rest.chunks(rest.len().div_ceil(3).max(1));
    for key in ["boot_marker", "crash_count", "reset_burst"] {
        nvs.inject_raw(NAMESPACE, key, chunks.next().unwrap_or(&[]));
    }

    let mut store = PersistedStore::new(nvs);
    let _report = ResetDetector::new(ResilienceConfig::default()).classify_boot(&mut store, now);
    assert!(store.get::<BootMarker>().present);
});
