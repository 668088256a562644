//! ESP32 time adapter.
//!
//! Two clocks:
//!
//! - [`uptime_ms`](Esp32TimeAdapter::uptime_ms): monotonic since this
//!   boot, drives the scheduler.
//! - [`rtc_ms`](Esp32TimeAdapter::rtc_ms): keeps counting across a warm
//!   reset, so the reset-burst window can span reboots.
//!
//! - **`target_os = "espidf"`**: `esp_timer_get_time()` and
//!   `esp_rtc_get_time_us()`.
//! - **`not(target_os = "espidf")`**: `std::time::Instant` for uptime and a
//!   settable offset standing in for the RTC.

use crate::Timestamp;

pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(not(target_os = "espidf"))]
    rtc_base_ms: Timestamp,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(target_os = "espidf"))]
            rtc_base_ms: 0,
        }
    }

    /// Simulation: start the RTC at `rtc_ms`, as if the device had been
    /// running that long before the last reset.
    #[cfg(not(target_os = "espidf"))]
    pub fn with_rtc_base(rtc_ms: Timestamp) -> Self {
        Self {
            start: std::time::Instant::now(),
            rtc_base_ms: rtc_ms,
        }
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_ms(&self) -> Timestamp {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_ms(&self) -> Timestamp {
        self.start.elapsed().as_millis() as u64
    }

    /// Milliseconds on the RTC slow clock, which is not reset by a
    /// software or watchdog reset.
    #[cfg(target_os = "espidf")]
    pub fn rtc_ms(&self) -> Timestamp {
        (unsafe { esp_idf_svc::sys::esp_rtc_get_time_us() }) / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn rtc_ms(&self) -> Timestamp {
        self.rtc_base_ms + self.uptime_ms()
    }
}
