//! Boot classification: crash-loop and manual reset-burst detection.
//!
//! Every boot sets a persisted marker; a boot that proves itself healthy
//! clears it. Finding the marker still set means the previous boot died
//! before confirming, and enough of those in a row is a crash loop.
//! Independently, several resets within a short window are read as the
//! user pressing reset on purpose to reach the configuration portal.
//!
//! ```text
//!  boot ──▶ marker set? ──yes──▶ crash_count += 1 ──▶ loop? ──yes──▶ CrashLoop
//!               │no                                     │no
//!               ▼                                       ▼
//!          reset window ──▶ count >= threshold? ──yes──▶ ManualResetBurst
//!                                  │no
//!                                  ▼
//!                                Normal
//! ```
//!
//! Storage failures fail open: the device boots `Normal` rather than
//! locking itself into the portal on a flash fault.
//!
//! The RTC used for the window restarts on a cold reset, so a boot that
//! outlives the window also expires it from the running side. A crash
//! loop keeps tripping on every boot until the recovery path re-arms the
//! counter.

use log::{error, info, warn};
use serde::Serialize;

use crate::Timestamp;
use crate::app::ports::{StorageError, StoragePort};
use crate::config::{BootConfirmPolicy, ResilienceConfig};
use crate::persist::{BootMarker, CrashCounter, PersistedStore, ResetBurst};

/// How this boot was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BootOutcome {
    Normal,
    /// Rapid resets by the user: open the configuration portal.
    ManualResetBurst,
    /// Repeated boots that never confirmed: enter recovery.
    CrashLoop,
}

impl BootOutcome {
    /// Whether the device should hand over to the recovery portal.
    pub const fn requires_recovery(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

/// Result of [`ResetDetector::classify_boot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootReport {
    pub outcome: BootOutcome,
    /// Consecutive unconfirmed boots before this one.
    pub crash_count: u32,
    /// Resets counted in the current window, this one included.
    pub reset_burst_count: u32,
    /// Running after at least one unconfirmed boot.
    pub degraded: bool,
    /// Persisted state could not be read or written.
    pub storage_fault: bool,
}

impl BootReport {
    fn fail_open() -> Self {
        Self {
            outcome: BootOutcome::Normal,
            crash_count: 0,
            reset_burst_count: 0,
            degraded: false,
            storage_fault: true,
        }
    }
}

pub struct ResetDetector {
    config: ResilienceConfig,
    outcome: Option<BootOutcome>,
    confirmed: bool,
    burst_expired: bool,
}

impl ResetDetector {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            config,
            outcome: None,
            confirmed: false,
            burst_expired: false,
        }
    }

    /// Classify the current boot. Call once, before anything that could crash.
    ///
    /// `now` must come from a clock that keeps counting across a warm reset.
    pub fn classify_boot<S: StoragePort>(
        &mut self,
        store: &mut PersistedStore<S>,
        now: Timestamp,
    ) -> BootReport {
        let mut report = self.try_classify(store, now).unwrap_or_else(|e| {
            error!("ResetDetector: storage fault during classification ({}), booting normally", e);
            BootReport::fail_open()
        });

        if let Err(e) = store.set_durable(&BootMarker { present: true }) {
            error!("ResetDetector: failed to set boot marker: {}", e);
            report.storage_fault = true;
        }

        info!(
            "ResetDetector: {:?} (crashes={}, resets={}, degraded={})",
            report.outcome, report.crash_count, report.reset_burst_count, report.degraded
        );
        self.outcome = Some(report.outcome);
        report
    }

    fn try_classify<S: StoragePort>(
        &self,
        store: &mut PersistedStore<S>,
        now: Timestamp,
    ) -> Result<BootReport, StorageError> {
        let marker = store.try_get::<BootMarker>()?;
        let mut crashes = store.try_get::<CrashCounter>()?;

        if marker.present {
            crashes.count = crashes.count.saturating_add(1);
            store.set_durable(&crashes)?;
            warn!("ResetDetector: previous boot never confirmed ({} in a row)", crashes.count);

            // This boot is the next unconfirmed one in the sequence.
            if crashes.count.saturating_add(1) >= self.config.crash_loop_threshold {
                return Ok(BootReport {
                    outcome: BootOutcome::CrashLoop,
                    crash_count: crashes.count,
                    reset_burst_count: 0,
                    degraded: true,
                    storage_fault: false,
                });
            }
        }

        let mut burst = store.try_get::<ResetBurst>()?;
        let in_window = burst.count > 0
            && now >= burst.window_start_ms
            && now - burst.window_start_ms <= self.config.reset_window_ms;
        if in_window {
            burst.count = burst.count.saturating_add(1);
        } else {
            burst = ResetBurst {
                count: 1,
                window_start_ms: now,
            };
        }

        let outcome = if burst.count >= self.config.reset_count_threshold {
            store.set_durable(&ResetBurst::default())?;
            BootOutcome::ManualResetBurst
        } else {
            store.set_durable(&burst)?;
            BootOutcome::Normal
        };

        Ok(BootReport {
            outcome,
            crash_count: crashes.count,
            reset_burst_count: burst.count,
            degraded: crashes.count > 0,
            storage_fault: false,
        })
    }

    /// Mark the running boot healthy: counter first, then marker, so a
    /// power loss in between leaves a zero count and a stale marker.
    pub fn confirm_boot<S: StoragePort>(
        &mut self,
        store: &mut PersistedStore<S>,
    ) -> Result<(), StorageError> {
        store.set_durable(&CrashCounter::default())?;
        store.set_durable(&BootMarker { present: false })?;
        self.confirmed = true;
        info!("ResetDetector: boot confirmed");
        Ok(())
    }

    /// Apply the confirmation policy. Returns `Ok(true)` on the call that
    /// confirms; only `Normal` boots are ever confirmed.
    pub fn poll_confirmation<S: StoragePort>(
        &mut self,
        store: &mut PersistedStore<S>,
        uptime_ms: Timestamp,
        sensor_ok: bool,
    ) -> Result<bool, StorageError> {
        if self.confirmed || self.outcome != Some(BootOutcome::Normal) {
            return Ok(false);
        }
        let due = match self.config.confirm_policy {
            BootConfirmPolicy::AfterFirstSensorRead => sensor_ok,
            BootConfirmPolicy::AfterUptime(ms) => uptime_ms >= ms,
        };
        if !due {
            return Ok(false);
        }
        self.confirm_boot(store)?;
        Ok(true)
    }

    /// Drop the reset window once a `Normal` boot has run past it.
    /// Attempted once per boot; returns `Ok(true)` if a record was cleared.
    pub fn poll_burst_expiry<S: StoragePort>(
        &mut self,
        store: &mut PersistedStore<S>,
        uptime_ms: Timestamp,
    ) -> Result<bool, StorageError> {
        if self.burst_expired
            || self.outcome != Some(BootOutcome::Normal)
            || uptime_ms < self.config.reset_window_ms
        {
            return Ok(false);
        }
        self.burst_expired = true;
        if store.try_get::<ResetBurst>()? == ResetBurst::default() {
            return Ok(false);
        }
        store.set_durable(&ResetBurst::default())?;
        info!("ResetDetector: reset window expired after {}ms uptime", uptime_ms);
        Ok(true)
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn outcome(&self) -> Option<BootOutcome> {
        self.outcome
    }
}

/// Re-arm normal boots after the recovery portal has run: the next boot
/// starts with a zero crash count and no pending marker.
pub fn rearm_after_recovery<S: StoragePort>(
    store: &mut PersistedStore<S>,
) -> Result<(), StorageError> {
    store.set_durable(&CrashCounter::default())?;
    store.set_durable(&BootMarker { present: false })?;
    info!("ResetDetector: re-armed after recovery");
    Ok(())
}
