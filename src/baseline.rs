//! Remote pressure-baseline commands.
//!
//! Grammar (trimmed, case-insensitive):
//!
//! ```text
//!  calibrate | set_baseline     capture the latest raw pressure
//!  baseline <hPa>               set an explicit baseline
//!  baseline 0 | clear_baseline  disable relative pressure
//! ```
//!
//! A rejected command never changes the baseline.

use log::{info, warn};
use serde::Serialize;

use crate::Timestamp;
use crate::app::ports::StoragePort;
use crate::calibration::hpa_to_pa;
use crate::config::SENSOR_PRESSURE_RANGE_HPA;
use crate::error::CommandError;
use crate::persist::{PersistedStore, PressureBaseline};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaselineCommand {
    /// Use the most recent raw pressure.
    CaptureCurrent,
    /// Explicit value in hPa, already range-checked.
    SetHpa(f32),
    Clear,
}

impl BaselineCommand {
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let mut tokens = text.split_whitespace();
        let word = tokens.next().ok_or(CommandError::UnknownCommand)?;

        let cmd = if word.eq_ignore_ascii_case("calibrate") || word.eq_ignore_ascii_case("set_baseline") {
            Self::CaptureCurrent
        } else if word.eq_ignore_ascii_case("clear_baseline") {
            Self::Clear
        } else if word.eq_ignore_ascii_case("baseline") {
            let arg = tokens.next().ok_or(CommandError::InvalidArgument)?;
            let hpa: f32 = arg.parse().map_err(|_| CommandError::InvalidArgument)?;
            let (lo, hi) = SENSOR_PRESSURE_RANGE_HPA;
            if hpa.abs() < f32::EPSILON {
                Self::Clear
            } else if hpa.is_finite() && (lo..=hi).contains(&hpa) {
                Self::SetHpa(hpa)
            } else {
                return Err(CommandError::InvalidArgument);
            }
        } else {
            return Err(CommandError::UnknownCommand);
        };

        if tokens.next().is_some() {
            return Err(CommandError::InvalidArgument);
        }
        Ok(cmd)
    }
}

/// Where the effective baseline came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BaselineSource {
    /// Configured default, nothing stored yet.
    Default,
    /// Restored from the persisted store at boot.
    Stored,
    /// Captured from a live reading by `calibrate`.
    Captured,
    /// Explicit value from `baseline <hPa>`.
    Explicit,
    Cleared,
}

/// Outcome of an accepted command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineAction {
    /// New effective baseline (Pa); `None` disables tracking.
    pub baseline_pa: Option<f32>,
    pub source: BaselineSource,
}

pub struct BaselineProcessor {
    baseline_pa: Option<f32>,
    source: BaselineSource,
    last_reading: Option<(f32, Timestamp)>,
    max_reading_age_ms: u64,
}

impl BaselineProcessor {
    /// A processor with no baseline. `max_reading_age_ms` bounds how old a
    /// reading `calibrate` may capture.
    pub fn new(max_reading_age_ms: u64) -> Self {
        Self {
            baseline_pa: None,
            source: BaselineSource::Default,
            last_reading: None,
            max_reading_age_ms,
        }
    }

    /// Restore the persisted baseline, or `default_pa` on first boot.
    pub fn load<S: StoragePort>(
        store: &PersistedStore<S>,
        default_pa: Option<f32>,
        max_reading_age_ms: u64,
    ) -> Self {
        let mut this = Self::new(max_reading_age_ms);
        if store.contains::<PressureBaseline>() {
            this.baseline_pa = store.get::<PressureBaseline>().0;
            this.source = BaselineSource::Stored;
        } else {
            this.baseline_pa = default_pa;
        }
        info!("Baseline: {:?} ({:?})", this.baseline_pa, this.source);
        this
    }

    pub fn baseline_pa(&self) -> Option<f32> {
        self.baseline_pa
    }

    pub fn source(&self) -> BaselineSource {
        self.source
    }

    /// Remember the latest raw pressure for `calibrate`.
    pub fn record_reading(&mut self, pressure_pa: f32, now: Timestamp) {
        self.last_reading = Some((pressure_pa, now));
    }

    fn fresh_reading(&self, now: Timestamp) -> Option<f32> {
        self.last_reading
            .filter(|(_, at)| now.saturating_sub(*at) <= self.max_reading_age_ms)
            .map(|(pa, _)| pa)
    }

    /// Apply a parsed command. The new value is buffered for the next
    /// store flush.
    pub fn handle_command<S: StoragePort>(
        &mut self,
        cmd: BaselineCommand,
        now: Timestamp,
        store: &mut PersistedStore<S>,
    ) -> Result<BaselineAction, CommandError> {
        let (baseline_pa, source) = match cmd {
            BaselineCommand::CaptureCurrent => {
                let pa = self.fresh_reading(now).ok_or(CommandError::NoReadingAvailable)?;
                (Some(pa), BaselineSource::Captured)
            }
            BaselineCommand::SetHpa(hpa) => (Some(hpa_to_pa(hpa)), BaselineSource::Explicit),
            BaselineCommand::Clear => (None, BaselineSource::Cleared),
        };

        self.baseline_pa = baseline_pa;
        self.source = source;
        if let Err(e) = store.set_lazy(&PressureBaseline(baseline_pa)) {
            warn!("Baseline: persisting failed ({}), value applies until reboot", e);
        }
        info!("Baseline: {:?} ({:?})", baseline_pa, source);
        Ok(BaselineAction { baseline_pa, source })
    }

    /// Parse and apply a raw command string.
    pub fn handle_text<S: StoragePort>(
        &mut self,
        text: &str,
        now: Timestamp,
        store: &mut PersistedStore<S>,
    ) -> Result<BaselineAction, CommandError> {
        let cmd = BaselineCommand::parse(text)?;
        self.handle_command(cmd, now, store)
    }
}
