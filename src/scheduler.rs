//! Non-blocking interval scheduler.
//!
//! The main loop calls [`Scheduler::tick`] as often as it likes; each call
//! returns the tasks whose interval has elapsed and stamps them with `now`.
//! The scheduler never sleeps and never runs work itself.
//!
//! ```text
//!   loop ──▶ tick(now) ──▶ [ConnectivityCheck, SensorRead, ...]
//!     ▲                               │
//!     └──────── caller runs each ◀────┘
//! ```
//!
//! A task that missed several intervals fires once and resumes its cadence
//! from `now`; there is no catch-up burst.

use core::fmt;

use log::info;
use serde::Serialize;

use crate::Timestamp;
use crate::config::TimingConfig;

/// Maximum number of concurrent tasks (stack-allocated).
pub const MAX_TASKS: usize = 4;

/// Periodic work items, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskId {
    ConnectivityCheck,
    SensorRead,
    /// Write buffered baseline changes to flash.
    StoreFlush,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub interval_ms: u32,
    /// `None` until the first dispatch; such a task is due immediately.
    pub last_run_at: Option<Timestamp>,
    pub enabled: bool,
}

impl ScheduledTask {
    fn is_due(&self, now: Timestamp) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_run_at {
            None => true,
            Some(last) => now >= last && now - last >= u64::from(self.interval_ms),
        }
    }
}

/// Tasks returned by one [`Scheduler::tick`].
pub type DueTasks = heapless::Vec<TaskId, MAX_TASKS>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    Duplicate,
    ZeroInterval,
    Full,
    UnknownTask,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate => write!(f, "task already scheduled"),
            Self::ZeroInterval => write!(f, "interval must be > 0"),
            Self::Full => write!(f, "task table full"),
            Self::UnknownTask => write!(f, "no such task"),
        }
    }
}

pub struct Scheduler {
    tasks: heapless::Vec<ScheduledTask, MAX_TASKS>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: heapless::Vec::new(),
        }
    }

    /// The standard task table: connectivity, sensor read, store flush.
    pub fn from_timing(timing: &TimingConfig) -> Result<Self, ScheduleError> {
        let mut s = Self::new();
        s.add(TaskId::ConnectivityCheck, timing.wifi_check_interval_ms)?;
        s.add(TaskId::SensorRead, timing.sensor_read_interval_ms)?;
        s.add(TaskId::StoreFlush, timing.store_flush_interval_ms)?;
        Ok(s)
    }

    pub fn add(&mut self, id: TaskId, interval_ms: u32) -> Result<(), ScheduleError> {
        if interval_ms == 0 {
            return Err(ScheduleError::ZeroInterval);
        }
        if self.find(id).is_some() {
            return Err(ScheduleError::Duplicate);
        }
        self.tasks
            .push(ScheduledTask {
                id,
                interval_ms,
                last_run_at: None,
                enabled: true,
            })
            .map_err(|_| ScheduleError::Full)?;
        info!("Scheduler: added {:?} every {}ms", id, interval_ms);
        Ok(())
    }

    /// Remove a task; the remaining tasks keep their order.
    pub fn remove(&mut self, id: TaskId) -> Result<(), ScheduleError> {
        let idx = self.index_of(id).ok_or(ScheduleError::UnknownTask)?;
        self.tasks.remove(idx);
        Ok(())
    }

    /// Change a cadence. The next dispatch is measured from the last run.
    pub fn set_interval(&mut self, id: TaskId, interval_ms: u32) -> Result<(), ScheduleError> {
        if interval_ms == 0 {
            return Err(ScheduleError::ZeroInterval);
        }
        let task = self.find_mut(id).ok_or(ScheduleError::UnknownTask)?;
        task.interval_ms = interval_ms;
        Ok(())
    }

    pub fn set_enabled(&mut self, id: TaskId, enabled: bool) -> Result<(), ScheduleError> {
        let task = self.find_mut(id).ok_or(ScheduleError::UnknownTask)?;
        task.enabled = enabled;
        Ok(())
    }

    /// Return every due task in declaration order and mark it run at `now`.
    ///
    /// A clock that moved backwards makes nothing due until it passes the
    /// recorded run time again.
    pub fn tick(&mut self, now: Timestamp) -> DueTasks {
        let mut due = DueTasks::new();
        for task in self.tasks.iter_mut().filter(|t| t.is_due(now)) {
            task.last_run_at = Some(now);
            // Cannot overflow: `due` has the same capacity as `tasks`.
            let _ = due.push(task.id);
        }
        due
    }

    /// Milliseconds until the next enabled task is due; `Some(0)` if one
    /// is due now, `None` if nothing is enabled.
    pub fn next_due_in(&self, now: Timestamp) -> Option<u64> {
        self.tasks
            .iter()
            .filter(|t| t.enabled)
            .map(|t| match t.last_run_at {
                None => 0,
                Some(last) => (last + u64::from(t.interval_ms)).saturating_sub(now),
            })
            .min()
    }

    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.enabled).count()
    }

    pub fn task(&self, id: TaskId) -> Option<&ScheduledTask> {
        self.find(id)
    }

    fn index_of(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    fn find(&self, id: TaskId) -> Option<&ScheduledTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn find_mut(&mut self, id: TaskId) -> Option<&mut ScheduledTask> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }
}
