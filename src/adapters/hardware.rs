//! Hardware adapter: bridges the BME280 and the battery ADC to [`SensorPort`].
//!
//! - **`target_os = "espidf"`**: BME280 over `I2cDriver` (forced mode,
//!   `bme280` crate) and an ADC1 oneshot channel on the battery divider.
//! - **`not(target_os = "espidf")`**: a settable sample and ADC count for
//!   simulation runs.
//!
//! A sensor that fails to initialise at boot does not stop the firmware;
//! initialisation is retried on every scheduled read.

use embedded_hal::i2c::I2c;

use crate::app::ports::SensorPort;
use crate::calibration::RawSample;
use crate::config::DeviceConfig;
use crate::error::{AdcError, BusError};

#[cfg(target_os = "espidf")]
use bme280::i2c::BME280;
#[cfg(target_os = "espidf")]
use esp_idf_hal::{delay::Ets, gpio::AnyIOPin, i2c::I2C0, i2c::I2cConfig, i2c::I2cDriver, units::Hertz};
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use log::{info, warn};

/// `id` register of the BME280.
const REG_CHIP_ID: u8 = 0xD0;
const BME280_CHIP_ID: u8 = 0x60;
/// BMP280 answers at the same address but has no humidity channel.
const BMP280_CHIP_ID: u8 = 0x58;

/// Check that a BME280 answers at `addr`.
pub fn probe_bme280<I: I2c>(bus: &mut I, addr: u8) -> Result<(), BusError> {
    let mut id = [0u8; 1];
    bus.write_read(addr, &[REG_CHIP_ID], &mut id)
        .map_err(|_| BusError::NotPresent)?;
    match id[0] {
        BME280_CHIP_ID => Ok(()),
        BMP280_CHIP_ID => {
            log::warn!("HardwareAdapter: BMP280 at 0x{:02X}, humidity unsupported", addr);
            Err(BusError::NotPresent)
        }
        other => {
            log::warn!("HardwareAdapter: unknown chip id 0x{:02X} at 0x{:02X}", other, addr);
            Err(BusError::NotPresent)
        }
    }
}

// ── Battery ADC (ESP-IDF oneshot) ─────────────────────────────

#[cfg(target_os = "espidf")]
struct BatteryAdc {
    handle: adc_oneshot_unit_handle_t,
    channel: adc_channel_t,
}

#[cfg(target_os = "espidf")]
impl BatteryAdc {
    /// Configure the ADC1 channel wired to `gpio` at 12 dB / 12 bit.
    fn new(gpio: i32) -> Result<Self, AdcError> {
        let mut unit: adc_unit_t = 0;
        let mut channel: adc_channel_t = 0;
        // SAFETY: plain lookup, no state.
        if unsafe { adc_oneshot_io_to_channel(gpio, &mut unit, &mut channel) } != ESP_OK {
            return Err(AdcError::NotFitted);
        }

        let init_cfg = adc_oneshot_unit_init_cfg_t {
            unit_id: unit,
            ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
            ..Default::default()
        };
        let mut handle: adc_oneshot_unit_handle_t = core::ptr::null_mut();
        // SAFETY: called once from the main task during bring-up.
        if unsafe { adc_oneshot_new_unit(&init_cfg, &mut handle) } != ESP_OK {
            return Err(AdcError::ReadFailed);
        }

        let chan_cfg = adc_oneshot_chan_cfg_t {
            atten: adc_atten_t_ADC_ATTEN_DB_12,
            bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
        };
        if unsafe { adc_oneshot_config_channel(handle, channel, &chan_cfg) } != ESP_OK {
            return Err(AdcError::ReadFailed);
        }
        info!("HardwareAdapter: battery ADC on GPIO{} (channel {})", gpio, channel);
        Ok(Self { handle, channel })
    }

    fn read(&mut self) -> Result<u16, AdcError> {
        let mut raw: i32 = 0;
        // SAFETY: handle is valid for the adapter's lifetime; main task only.
        if unsafe { adc_oneshot_read(self.handle, self.channel, &mut raw) } != ESP_OK {
            return Err(AdcError::ReadFailed);
        }
        Ok(raw.clamp(0, 4095) as u16)
    }
}

// ── Adapter ───────────────────────────────────────────────────

pub struct HardwareAdapter {
    #[cfg(target_os = "espidf")]
    bme: BME280<I2cDriver<'static>>,
    #[cfg(target_os = "espidf")]
    battery: Option<BatteryAdc>,
    #[cfg(target_os = "espidf")]
    initialised: bool,

    #[cfg(not(target_os = "espidf"))]
    sample: Result<RawSample, BusError>,
    #[cfg(not(target_os = "espidf"))]
    battery_adc: Option<u16>,
}

#[cfg(target_os = "espidf")]
impl HardwareAdapter {
    /// Bring up the I2C bus on the configured pins and probe the BME280.
    pub fn new(i2c: I2C0, config: &DeviceConfig) -> Result<Self, esp_idf_hal::sys::EspError> {
        // SAFETY: pin numbers come from the board profile; no other driver
        // claims them.
        let (sda, scl) = unsafe { (AnyIOPin::new(config.i2c.sda), AnyIOPin::new(config.i2c.scl)) };
        let mut driver = I2cDriver::new(i2c, sda, scl, &I2cConfig::new().baudrate(Hertz(100_000)))?;
        let addr = config.sensor_address.addr();
        if let Err(e) = probe_bme280(&mut driver, addr) {
            warn!("HardwareAdapter: no BME280 at 0x{:02X} ({}), check wiring", addr, e);
        }

        let battery = config.battery.and_then(|cal| match BatteryAdc::new(cal.adc_gpio) {
            Ok(adc) => Some(adc),
            Err(e) => {
                warn!("HardwareAdapter: battery monitor unavailable: {}", e);
                None
            }
        });

        let mut this = Self {
            bme: BME280::new(driver, addr),
            battery,
            initialised: false,
        };
        this.ensure_initialised();
        Ok(this)
    }

    fn ensure_initialised(&mut self) -> bool {
        if !self.initialised {
            match self.bme.init(&mut Ets) {
                Ok(()) => {
                    info!("HardwareAdapter: BME280 ready");
                    self.initialised = true;
                }
                Err(e) => warn!("HardwareAdapter: BME280 init failed: {:?}", e),
            }
        }
        self.initialised
    }
}

#[cfg(target_os = "espidf")]
impl SensorPort for HardwareAdapter {
    fn read_raw_sample(&mut self) -> Result<RawSample, BusError> {
        if !self.ensure_initialised() {
            return Err(BusError::NotPresent);
        }
        let m = self.bme.measure(&mut Ets).map_err(|e| {
            warn!("HardwareAdapter: BME280 measure failed: {:?}", e);
            // Force a re-probe: the sensor may have browned out.
            self.initialised = false;
            BusError::TransferFailed
        })?;
        Ok(RawSample {
            temperature_c: m.temperature,
            humidity_pct: m.humidity,
            pressure_pa: m.pressure,
        })
    }

    fn read_battery_adc(&mut self) -> Result<u16, AdcError> {
        self.battery.as_mut().ok_or(AdcError::NotFitted)?.read()
    }
}

#[cfg(not(target_os = "espidf"))]
impl HardwareAdapter {
    /// Simulation: a sea-level room reading, plus a half-charged battery
    /// when the profile has a divider.
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            sample: Ok(RawSample {
                temperature_c: 21.5,
                humidity_pct: 45.0,
                pressure_pa: crate::config::PRESSURE_SEA_LEVEL_PA,
            }),
            battery_adc: config.battery.map(|_| 2_600),
        }
    }

    pub fn set_sample(&mut self, sample: RawSample) {
        self.sample = Ok(sample);
    }

    pub fn set_bus_fault(&mut self, fault: BusError) {
        self.sample = Err(fault);
    }

    pub fn set_battery_adc(&mut self, adc: Option<u16>) {
        self.battery_adc = adc;
    }
}

#[cfg(not(target_os = "espidf"))]
impl SensorPort for HardwareAdapter {
    fn read_raw_sample(&mut self) -> Result<RawSample, BusError> {
        self.sample
    }

    fn read_battery_adc(&mut self) -> Result<u16, AdcError> {
        self.battery_adc.ok_or(AdcError::NotFitted)
    }
}
