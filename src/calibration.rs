//! Raw reading → physical unit conversion.
//!
//! Pure functions over configured constants. Out-of-range input is clamped,
//! never rejected; constants that could divide by zero are rejected when the
//! [`Calibrator`] is built, so nothing here can fail at read time.

use serde::{Deserialize, Serialize};

use crate::config::{BatteryCalibration, DeviceConfig, SensorCalibration};
use crate::error::{BusError, ConfigError};

// ---------------------------------------------------------------------------
// Raw and calibrated samples
// ---------------------------------------------------------------------------

/// One BME280 measurement in sensor-native units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_pa: f32,
}

impl RawSample {
    /// Drivers report NaN when a compensation step fails.
    pub fn validate(self) -> Result<Self, BusError> {
        let finite = self.temperature_c.is_finite()
            && self.humidity_pct.is_finite()
            && self.pressure_pa.is_finite();
        if finite && self.pressure_pa > 0.0 {
            Ok(self)
        } else {
            Err(BusError::InvalidReading)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub voltage: f32,
    pub percent: f32,
}

/// A reading ready for publishing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibratedReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    /// Absolute pressure (Pa).
    pub pressure_pa: f32,
    /// Deviation from the baseline (Pa); equals `pressure_pa` when tracking is off.
    pub relative_pressure_pa: f32,
    pub baseline_pa: Option<f32>,
    pub altitude_m: f32,
    pub battery: Option<BatteryReading>,
}

// ---------------------------------------------------------------------------
// Pure conversions
// ---------------------------------------------------------------------------

pub fn calibrate_temperature(raw_c: f32, offset_c: f32) -> f32 {
    raw_c + offset_c
}

pub fn calibrate_humidity(raw_pct: f32, offset_pct: f32) -> f32 {
    (raw_pct + offset_pct).clamp(0.0, 100.0)
}

pub fn relative_pressure(raw_pa: f32, baseline_pa: Option<f32>) -> f32 {
    match baseline_pa {
        None => raw_pa,
        Some(baseline) => raw_pa - baseline,
    }
}

/// Battery terminal voltage from an ADC count.
pub fn battery_voltage(adc_reading: f32, cal: &BatteryCalibration) -> f32 {
    (adc_reading / cal.adc_max) * cal.ref_voltage * cal.divider_ratio * cal.calibration_factor
}

/// Linear state of charge between `min_v` (0 %) and `max_v` (100 %).
pub fn battery_percent(adc_reading: f32, cal: &BatteryCalibration) -> f32 {
    let v = battery_voltage(adc_reading, cal);
    ((v - cal.min_v) / (cal.max_v - cal.min_v) * 100.0).clamp(0.0, 100.0)
}

/// International barometric formula.
pub fn altitude_m(pressure_pa: f32, sea_level_pa: f32) -> f32 {
    44_330.0 * (1.0 - (pressure_pa / sea_level_pa).powf(0.190_3))
}

pub fn pa_to_hpa(pa: f32) -> f32 {
    pa / 100.0
}

pub fn hpa_to_pa(hpa: f32) -> f32 {
    hpa * 100.0
}

// ---------------------------------------------------------------------------
// Calibrator
// ---------------------------------------------------------------------------

/// Validated calibration constants for one device.
#[derive(Debug, Clone, Copy)]
pub struct Calibrator {
    sensor: SensorCalibration,
    battery: Option<BatteryCalibration>,
}

impl Calibrator {
    /// Fails with [`ConfigError`] on constants that would divide by zero.
    pub fn new(config: &DeviceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            sensor: config.sensor,
            battery: config.battery,
        })
    }

    /// Whether this board has a battery divider to read.
    pub fn has_battery(&self) -> bool {
        self.battery.is_some()
    }

    pub fn battery(&self, adc_reading: u16) -> Option<BatteryReading> {
        self.battery.map(|cal| {
            let adc = adc_reading as f32;
            BatteryReading {
                voltage: battery_voltage(adc, &cal),
                percent: battery_percent(adc, &cal),
            }
        })
    }

    pub fn apply(
        &self,
        raw: &RawSample,
        baseline_pa: Option<f32>,
        battery_adc: Option<u16>,
    ) -> CalibratedReading {
        CalibratedReading {
            temperature_c: calibrate_temperature(raw.temperature_c, self.sensor.temp_offset_c),
            humidity_pct: calibrate_humidity(raw.humidity_pct, self.sensor.humidity_offset_pct),
            pressure_pa: raw.pressure_pa,
            relative_pressure_pa: relative_pressure(raw.pressure_pa, baseline_pa),
            baseline_pa,
            altitude_m: altitude_m(raw.pressure_pa, self.sensor.sea_level_pa),
            battery: battery_adc.and_then(|adc| self.battery(adc)),
        }
    }
}
