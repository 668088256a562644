//! Device identity and board detection.
//!
//! The default device ID is `ESP-XXYYZZ`: the last 3 bytes of the factory
//! MAC in uppercase hex. It is stable across reboots (eFuse MAC) and is
//! what telemetry reports unless the build sets an explicit ID.

use core::fmt::Write;

use crate::config::{BoardVariant, DeviceIdentity};

pub type DeviceIdString = heapless::String<24>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x24, 0x6F, 0x28, 0x1A, 0x2B, 0x3C]
}

/// `ESP-XXYYZZ` from the last 3 MAC bytes.
pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    let _ = write!(id, "ESP-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}

/// Lowercase network hostname, e.g. `sensorhub-1a2b3c`.
pub fn hostname(mac: &MacAddress) -> heapless::String<24> {
    let mut name = heapless::String::<24>::new();
    let _ = write!(name, "sensorhub-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}

/// Fill in the MAC-derived ID when none was configured.
pub fn resolve(identity: &mut DeviceIdentity, mac: &MacAddress) {
    if identity.device_id.as_ref().is_none_or(|id| id.is_empty()) {
        identity.device_id = Some(device_id(mac));
    }
}

/// Chip family of the running device.
#[cfg(target_os = "espidf")]
pub fn detect_board() -> BoardVariant {
    use esp_idf_svc::sys::{esp_chip_info, esp_chip_info_t, esp_chip_model_t_CHIP_ESP32S3};

    let mut info: esp_chip_info_t = unsafe { core::mem::zeroed() };
    unsafe { esp_chip_info(&mut info) };
    if info.model == esp_chip_model_t_CHIP_ESP32S3 {
        BoardVariant::Esp32S3
    } else {
        BoardVariant::Esp32
    }
}

/// Simulation: `SENSORHUB_BOARD` (e.g. `esp32s3`), defaulting to ESP32.
#[cfg(not(target_os = "espidf"))]
pub fn detect_board() -> BoardVariant {
    std::env::var("SENSORHUB_BOARD")
        .ok()
        .and_then(|name| BoardVariant::from_name(&name))
        .unwrap_or(BoardVariant::Esp32)
}
