//! CPU frequency management.
//!
//! The node spends almost all of its time idle between scheduled tasks,
//! so it runs the CPU at the profile's reduced frequency (80 MHz by
//! default). Dynamic frequency scaling is pinned: min and max are equal.

use log::{info, warn};

/// Raw ESP-IDF error code from `esp_pm_configure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerError(pub i32);

impl core::fmt::Display for PowerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "esp_pm_configure failed (rc={})", self.0)
    }
}

/// Lock the CPU clock at `mhz`.
#[cfg(target_os = "espidf")]
pub fn set_cpu_frequency(mhz: u16) -> Result<(), PowerError> {
    use esp_idf_svc::sys::{ESP_OK, esp_pm_config_t, esp_pm_configure};

    let cfg = esp_pm_config_t {
        max_freq_mhz: i32::from(mhz),
        min_freq_mhz: i32::from(mhz),
        light_sleep_enable: false,
    };
    // SAFETY: cfg outlives the call; esp_pm_configure copies it.
    let ret = unsafe { esp_pm_configure(&cfg as *const esp_pm_config_t as *const _) };
    if ret != ESP_OK {
        warn!("Power: could not set CPU to {} MHz (rc={})", mhz, ret);
        return Err(PowerError(ret));
    }
    info!("Power: CPU locked at {} MHz", mhz);
    Ok(())
}

/// Simulation: nothing to configure.
#[cfg(not(target_os = "espidf"))]
pub fn set_cpu_frequency(mhz: u16) -> Result<(), PowerError> {
    if mhz == 0 {
        warn!("Power: refusing 0 MHz");
        return Err(PowerError(-1));
    }
    info!("Power: CPU at {} MHz (simulated)", mhz);
    Ok(())
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn sim_accepts_profile_frequency() {
        assert_eq!(set_cpu_frequency(80), Ok(()));
        assert_eq!(set_cpu_frequency(0), Err(PowerError(-1)));
    }
}
