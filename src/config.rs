//! Device configuration.
//!
//! Built once at startup from the detected [`BoardVariant`] and the build
//! options, validated, then passed by reference to every component that
//! needs it. Nothing reads configuration from globals.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Sea-level reference pressure (Pa) for altitude calculation.
pub const PRESSURE_SEA_LEVEL_PA: f32 = 101_325.0;

/// Inclusive range of pressures (hPa) the BME280 can measure.
pub const SENSOR_PRESSURE_RANGE_HPA: (f32, f32) = (300.0, 1100.0);

// ---------------------------------------------------------------------------
// Board variants
// ---------------------------------------------------------------------------

/// Supported board families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardVariant {
    Esp8266,
    Esp32,
    Esp32S3,
}

impl BoardVariant {
    /// Board name as reported in telemetry.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Esp8266 => "esp8266",
            Self::Esp32 => "esp32",
            Self::Esp32S3 => "esp32s3",
        }
    }

    /// Parse a board name (`"esp32"`, `"ESP32-S3"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let mut norm = heapless::String::<16>::new();
        for c in name.trim().chars().filter(|c| *c != '-' && *c != '_') {
            norm.push(c.to_ascii_lowercase()).ok()?;
        }
        match norm.as_str() {
            "esp8266" => Some(Self::Esp8266),
            "esp32" => Some(Self::Esp32),
            "esp32s3" => Some(Self::Esp32S3),
            _ => None,
        }
    }
}

/// BME280 I2C address, selected by the SDO strap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorAddress {
    /// SDO tied low.
    Primary,
    /// SDO tied high.
    Secondary,
}

impl SensorAddress {
    pub const fn addr(self) -> u8 {
        match self {
            Self::Primary => 0x76,
            Self::Secondary => 0x77,
        }
    }
}

/// Build-time choices that differ between deployments of the same board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Battery divider fitted (TP4056 + 10k/10k divider).
    pub battery_powered: bool,
    /// Allow battery monitoring on ESP32-S3 (GPIO 4 divider). Older
    /// deployments of the S3 board have no divider on that pin.
    pub battery_on_s3: bool,
    pub sensor_address: SensorAddress,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            battery_powered: option_env!("SENSORHUB_BATTERY_POWERED").is_some_and(|v| v == "1"),
            battery_on_s3: false,
            sensor_address: SensorAddress::Primary,
        }
    }
}

// ---------------------------------------------------------------------------
// Calibration constants
// ---------------------------------------------------------------------------

/// Linear battery voltage mapping. Configured per board, never learned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryCalibration {
    /// ADC GPIO carrying the divided battery voltage.
    pub adc_gpio: i32,
    pub divider_ratio: f32,
    pub calibration_factor: f32,
    pub ref_voltage: f32,
    pub adc_max: f32,
    /// Voltage reported as 0 %.
    pub min_v: f32,
    /// Voltage reported as 100 %.
    pub max_v: f32,
}

impl BatteryCalibration {
    /// 10k/10k divider on a 12-bit ADC with a single-cell LiPo.
    pub const fn lipo_divider(adc_gpio: i32) -> Self {
        Self {
            adc_gpio,
            divider_ratio: 2.0,
            calibration_factor: 1.134,
            ref_voltage: 3.3,
            adc_max: 4095.0,
            min_v: 3.0,
            max_v: 4.2,
        }
    }

    /// Reject constants that would divide by zero or produce NaN at read time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all_finite = [
            self.divider_ratio,
            self.calibration_factor,
            self.ref_voltage,
            self.adc_max,
            self.min_v,
            self.max_v,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !all_finite {
            return Err(ConfigError::InvalidCalibration("battery constants must be finite"));
        }
        if self.adc_max <= 0.0 {
            return Err(ConfigError::InvalidCalibration("adc_max must be > 0"));
        }
        if self.max_v <= self.min_v {
            return Err(ConfigError::InvalidCalibration("max_v must be > min_v"));
        }
        if self.divider_ratio <= 0.0 || self.calibration_factor <= 0.0 || self.ref_voltage <= 0.0 {
            return Err(ConfigError::InvalidCalibration(
                "divider_ratio, calibration_factor and ref_voltage must be > 0",
            ));
        }
        Ok(())
    }
}

/// Offsets applied to the BME280 readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorCalibration {
    pub temp_offset_c: f32,
    pub humidity_offset_pct: f32,
    pub sea_level_pa: f32,
}

impl Default for SensorCalibration {
    fn default() -> Self {
        Self {
            temp_offset_c: 0.0,
            humidity_offset_pct: 0.0,
            sea_level_pa: PRESSURE_SEA_LEVEL_PA,
        }
    }
}

// ---------------------------------------------------------------------------
// Resilience and timing
// ---------------------------------------------------------------------------

/// When a `Normal` boot is considered proven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootConfirmPolicy {
    /// First successful scheduled sensor read.
    AfterFirstSensorRead,
    /// Fixed uptime in milliseconds.
    AfterUptime(u64),
}

/// Crash-loop and reset-burst thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Consecutive unconfirmed boots that trigger recovery.
    pub crash_loop_threshold: u32,
    /// Resets within `reset_window_ms` that open the config portal.
    pub reset_count_threshold: u32,
    pub reset_window_ms: u64,
    pub confirm_policy: BootConfirmPolicy,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            crash_loop_threshold: 5,
            reset_count_threshold: 3,
            reset_window_ms: 2_000,
            confirm_policy: BootConfirmPolicy::AfterFirstSensorRead,
        }
    }
}

/// Periodic task cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    pub wifi_check_interval_ms: u32,
    pub sensor_read_interval_ms: u32,
    /// Batching interval for lazy persisted writes (baseline).
    pub store_flush_interval_ms: u32,
    /// Network collaborator timeout, enforced by the adapter.
    pub http_timeout_ms: u32,
}

// ---------------------------------------------------------------------------
// Device configuration
// ---------------------------------------------------------------------------

/// Board pin assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct I2cPins {
    pub sda: i32,
    pub scl: i32,
}

/// Identity fields reported with every publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Human-readable location ("Pump House").
    pub location: heapless::String<32>,
    /// Explicit device id; `None` derives one from the MAC.
    pub device_id: Option<heapless::String<24>>,
    pub timezone_offset_h: i8,
    pub firmware_version: heapless::String<16>,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        let mut location = heapless::String::new();
        let _ = location.push_str(option_env!("SENSORHUB_LOCATION").unwrap_or("Pump House"));
        let mut firmware_version = heapless::String::new();
        let _ = firmware_version.push_str(env!("CARGO_PKG_VERSION"));
        Self {
            location,
            device_id: None,
            timezone_offset_h: -5,
            firmware_version,
        }
    }
}

/// Complete, immutable device configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub board: BoardVariant,
    pub i2c: I2cPins,
    pub sensor_address: SensorAddress,
    /// `None` on boards without a battery divider.
    pub battery: Option<BatteryCalibration>,
    pub sensor: SensorCalibration,
    /// Baseline used until a remote command sets one (Pa). `None` disables.
    pub default_baseline_pa: Option<f32>,
    pub resilience: ResilienceConfig,
    pub timing: TimingConfig,
    pub cpu_freq_mhz: u16,
    pub identity: DeviceIdentity,
}

impl DeviceConfig {
    /// Resolve the configuration profile for a board.
    pub fn for_board(board: BoardVariant, opts: BuildOptions) -> Self {
        let i2c = match board {
            BoardVariant::Esp32S3 => I2cPins { sda: 8, scl: 9 },
            BoardVariant::Esp32 => I2cPins { sda: 21, scl: 22 },
            BoardVariant::Esp8266 => I2cPins { sda: 4, scl: 5 },
        };

        let battery = match board {
            _ if !opts.battery_powered => None,
            BoardVariant::Esp32 => Some(BatteryCalibration::lipo_divider(34)),
            BoardVariant::Esp32S3 if opts.battery_on_s3 => Some(BatteryCalibration::lipo_divider(4)),
            BoardVariant::Esp32S3 | BoardVariant::Esp8266 => None,
        };

        let http_timeout_ms = match board {
            BoardVariant::Esp8266 => 5_000,
            BoardVariant::Esp32 | BoardVariant::Esp32S3 => 10_000,
        };

        Self {
            board,
            i2c,
            sensor_address: opts.sensor_address,
            battery,
            sensor: SensorCalibration::default(),
            default_baseline_pa: None,
            resilience: ResilienceConfig::default(),
            timing: TimingConfig {
                wifi_check_interval_ms: 15_000,
                sensor_read_interval_ms: 30_000,
                store_flush_interval_ms: 60_000,
                http_timeout_ms,
            },
            cpu_freq_mhz: 80,
            identity: DeviceIdentity::default(),
        }
    }

    /// Validate every field. Called once at startup; failure is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(battery) = &self.battery {
            battery.validate()?;
        }

        let s = &self.sensor;
        if !s.temp_offset_c.is_finite() || !s.humidity_offset_pct.is_finite() {
            return Err(ConfigError::InvalidCalibration("sensor offsets must be finite"));
        }
        if !(s.sea_level_pa.is_finite() && s.sea_level_pa > 0.0) {
            return Err(ConfigError::InvalidCalibration("sea_level_pa must be > 0"));
        }
        if let Some(pa) = self.default_baseline_pa {
            if !(pa.is_finite() && pa > 0.0) {
                return Err(ConfigError::InvalidCalibration("default_baseline_pa must be > 0"));
            }
        }

        let r = &self.resilience;
        if r.crash_loop_threshold < 2 {
            return Err(ConfigError::ValidationFailed("crash_loop_threshold must be >= 2"));
        }
        if r.reset_count_threshold < 2 {
            return Err(ConfigError::ValidationFailed("reset_count_threshold must be >= 2"));
        }
        if r.reset_window_ms == 0 {
            return Err(ConfigError::ValidationFailed("reset_window_ms must be > 0"));
        }
        if r.confirm_policy == BootConfirmPolicy::AfterUptime(0) {
            return Err(ConfigError::ValidationFailed("confirm uptime must be > 0"));
        }

        let t = &self.timing;
        if t.wifi_check_interval_ms == 0
            || t.sensor_read_interval_ms == 0
            || t.store_flush_interval_ms == 0
        {
            return Err(ConfigError::ValidationFailed("task intervals must be > 0"));
        }
        if !(10..=240).contains(&self.cpu_freq_mhz) {
            return Err(ConfigError::ValidationFailed("cpu_freq_mhz must be 10-240"));
        }
        Ok(())
    }
}
