//! Recovery / configuration portal.
//!
//! Entered instead of the main loop after a `CrashLoop` or
//! `ManualResetBurst` boot. The device brings up an open access point
//! named after its hostname so the user can reach the configuration page
//! served by the provisioning collaborator, then restarts after
//! `timeout_ms`. Leaving the portal clears the crash count, so a crash
//! loop trips on every boot until a recovery has actually run.

use log::{info, warn};

use crate::app::ports::{RecoveryPort, StoragePort};
use crate::persist::PersistedStore;
use crate::resilience::{self, BootOutcome};

#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::delay::FreeRtos;
#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AccessPointConfiguration, AuthMethod, Configuration, EspWifi};

/// Default time the portal stays up before restarting.
pub const PORTAL_TIMEOUT_MS: u32 = 180_000;

pub struct ConfigPortal<S: StoragePort> {
    ap_name: heapless::String<24>,
    timeout_ms: u32,
    store: PersistedStore<S>,
    #[cfg(target_os = "espidf")]
    wifi: EspWifi<'static>,
}

impl<S: StoragePort> ConfigPortal<S> {
    /// Re-arm normal boots before the restart. A failed write leaves the
    /// crash loop armed; the next boot re-enters the portal.
    pub fn rearm(&mut self) {
        if let Err(e) = resilience::rearm_after_recovery(&mut self.store) {
            warn!("Portal: re-arm failed: {}", e);
        }
    }

    pub fn into_store(self) -> PersistedStore<S> {
        self.store
    }
}

#[cfg(target_os = "espidf")]
impl<S: StoragePort> ConfigPortal<S> {
    pub fn new(
        wifi: EspWifi<'static>,
        store: PersistedStore<S>,
        ap_name: heapless::String<24>,
        timeout_ms: u32,
    ) -> Self {
        Self {
            ap_name,
            timeout_ms,
            store,
            wifi,
        }
    }

    fn start_access_point(&mut self) -> Result<(), esp_idf_svc::sys::EspError> {
        let ap = AccessPointConfiguration {
            ssid: self.ap_name.as_str().try_into().unwrap_or_default(),
            auth_method: AuthMethod::None,
            ..Default::default()
        };
        self.wifi.set_configuration(&Configuration::AccessPoint(ap))?;
        self.wifi.start()
    }
}

#[cfg(target_os = "espidf")]
impl<S: StoragePort> RecoveryPort for ConfigPortal<S> {
    fn enter_recovery_mode(&mut self, reason: BootOutcome) -> ! {
        warn!("Portal: entering recovery ({:?})", reason);
        match self.start_access_point() {
            Ok(()) => info!("Portal: AP '{}' up for {}s", self.ap_name, self.timeout_ms / 1_000),
            Err(e) => warn!("Portal: AP start failed: {:?}", e),
        }
        let mut waited = 0;
        while waited < self.timeout_ms {
            FreeRtos::delay_ms(1_000);
            waited += 1_000;
        }
        info!("Portal: timeout, restarting");
        self.rearm();
        esp_idf_svc::hal::reset::restart()
    }
}

#[cfg(not(target_os = "espidf"))]
impl<S: StoragePort> ConfigPortal<S> {
    pub fn new(store: PersistedStore<S>, ap_name: heapless::String<24>, timeout_ms: u32) -> Self {
        Self {
            ap_name,
            timeout_ms,
            store,
        }
    }
}

/// Simulation: there is no portal to serve, so the process ends the way
/// the device would restart.
#[cfg(not(target_os = "espidf"))]
impl<S: StoragePort> RecoveryPort for ConfigPortal<S> {
    fn enter_recovery_mode(&mut self, reason: BootOutcome) -> ! {
        warn!("Portal: entering recovery ({:?})", reason);
        info!("Portal: AP '{}' (simulated, {}ms), exiting", self.ap_name, self.timeout_ms);
        self.rearm();
        std::process::exit(3)
    }
}
