//! Typed persisted state over a [`StoragePort`].
//!
//! A closed set of [`Slot`]s, one storage key each. Boot records are
//! written through before the caller continues (they must survive an
//! immediate power loss); the pressure baseline may be buffered and
//! flushed on the store-flush schedule.
//!
//! Boot records are framed as
//!
//! ```text
//!  ┌─────────┬──────────────────┬──────────────┐
//!  │ version │ postcard payload │ CRC-16 (LE)  │
//!  │   u8    │     N bytes      │   2 bytes    │
//!  └─────────┴──────────────────┴──────────────┘
//! ```
//!
//! so a torn or foreign value reads as [`StorageError::Corrupted`] rather
//! than as a plausible counter. The baseline is stored as decimal hPa text
//! so it can be edited by hand from the NVS tool.

use core::fmt::Write as _;

use crc::{CRC_16_IBM_3740, Crc};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::app::ports::{StorageError, StoragePort};
use crate::calibration::{hpa_to_pa, pa_to_hpa};

/// NVS namespace for every persisted slot.
pub const NAMESPACE: &str = "sensorhub";

/// Largest encoded slot, framing included.
pub const MAX_RECORD_LEN: usize = 32;

const RECORD_VERSION: u8 = 1;
const FRAME_OVERHEAD: usize = 3;
const MAX_PENDING: usize = 4;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Encoded bytes of one slot.
pub type RecordBuf = heapless::Vec<u8, MAX_RECORD_LEN>;

// ---------------------------------------------------------------------------
// Record framing
// ---------------------------------------------------------------------------

/// Frame `value` as `[version][postcard][crc16]`.
pub fn encode_record<T: Serialize>(value: &T, out: &mut RecordBuf) -> Result<(), StorageError> {
    out.clear();
    let mut scratch = [0u8; MAX_RECORD_LEN - FRAME_OVERHEAD];
    let payload = postcard::to_slice(value, &mut scratch).map_err(|_| StorageError::Full)?;
    out.push(RECORD_VERSION).map_err(|_| StorageError::Full)?;
    out.extend_from_slice(payload).map_err(|()| StorageError::Full)?;
    let crc = CRC16.checksum(out);
    out.extend_from_slice(&crc.to_le_bytes()).map_err(|()| StorageError::Full)
}

/// Verify and decode a framed record.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    if bytes.len() < FRAME_OVERHEAD {
        return Err(StorageError::Corrupted);
    }
    let (body, tail) = bytes.split_at(bytes.len() - 2);
    let stored = u16::from_le_bytes([tail[0], tail[1]]);
    if CRC16.checksum(body) != stored || body[0] != RECORD_VERSION {
        return Err(StorageError::Corrupted);
    }
    postcard::from_bytes(&body[1..]).map_err(|_| StorageError::Corrupted)
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// A value with a fixed storage key and its own encoding.
///
/// `Default` is what a first boot (nothing stored) reads.
pub trait Slot: Sized + Default {
    const KEY: &'static str;

    fn encode(&self, out: &mut RecordBuf) -> Result<(), StorageError>;

    fn decode(bytes: &[u8]) -> Result<Self, StorageError>;
}

macro_rules! framed_slot {
    ($ty:ty, $key:literal) => {
        impl Slot for $ty {
            const KEY: &'static str = $key;

            fn encode(&self, out: &mut RecordBuf) -> Result<(), StorageError> {
                encode_record(self, out)
            }

            fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
                decode_record(bytes)
            }
        }
    };
}

/// Set at every boot, cleared once the boot is confirmed healthy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootMarker {
    pub present: bool,
}

/// Consecutive boots that found the marker still set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashCounter {
    pub count: u32,
}

/// Resets seen inside the current detection window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetBurst {
    pub count: u32,
    /// RTC time of the first reset in the window.
    pub window_start_ms: u64,
}

framed_slot!(BootMarker, "boot_marker");
framed_slot!(CrashCounter, "crash_count");
framed_slot!(ResetBurst, "reset_burst");

/// Reference pressure in Pa; `None` disables relative pressure.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PressureBaseline(pub Option<f32>);

impl Slot for PressureBaseline {
    const KEY: &'static str = "p_baseline";

    fn encode(&self, out: &mut RecordBuf) -> Result<(), StorageError> {
        let mut text = heapless::String::<MAX_RECORD_LEN>::new();
        match self.0 {
            Some(pa) => write!(text, "{:.2}", pa_to_hpa(pa)),
            None => text.write_str("0"),
        }
        .map_err(|_| StorageError::Full)?;
        out.clear();
        out.extend_from_slice(text.as_bytes()).map_err(|()| StorageError::Full)
    }

    /// Empty, zero or negative text means tracking is disabled.
    fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        let text = core::str::from_utf8(bytes)
            .map_err(|_| StorageError::Corrupted)?
            .trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if text.is_empty() {
            return Ok(Self(None));
        }
        let hpa: f32 = text.parse().map_err(|_| StorageError::Corrupted)?;
        if hpa.is_finite() && hpa > 0.0 {
            Ok(Self(Some(hpa_to_pa(hpa))))
        } else {
            Ok(Self(None))
        }
    }
}

// ---------------------------------------------------------------------------
// PersistedStore
// ---------------------------------------------------------------------------

/// Typed facade over the raw blob store with a small lazy-write buffer.
pub struct PersistedStore<S: StoragePort> {
    backend: S,
    pending: heapless::Vec<(&'static str, RecordBuf), MAX_PENDING>,
}

impl<S: StoragePort> PersistedStore<S> {
    pub fn new(backend: S) -> Self {
        Self {
            backend,
            pending: heapless::Vec::new(),
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }

    /// Drop the facade. Pending lazy writes are lost.
    pub fn into_inner(self) -> S {
        self.backend
    }

    /// Stored value, or the default when nothing is stored yet.
    ///
    /// Pending lazy writes shadow the backend.
    pub fn try_get<T: Slot>(&self) -> Result<T, StorageError> {
        if let Some((_, bytes)) = self.pending.iter().find(|(key, _)| *key == T::KEY) {
            return T::decode(bytes);
        }
        let mut buf = [0u8; MAX_RECORD_LEN];
        match self.backend.read(NAMESPACE, T::KEY, &mut buf) {
            Ok(len) => T::decode(&buf[..len]),
            Err(StorageError::NotFound) => Ok(T::default()),
            Err(e) => Err(e),
        }
    }

    /// Like [`try_get`](Self::try_get) but falls back to the default on
    /// any error.
    pub fn get<T: Slot>(&self) -> T {
        self.try_get().unwrap_or_else(|e| {
            warn!("Store: {} unreadable ({}), using default", T::KEY, e);
            T::default()
        })
    }

    /// Write through to the backend before returning.
    ///
    /// A pending lazy value for the same key is discarded once the write
    /// lands, so a later flush cannot roll it back.
    pub fn set_durable<T: Slot>(&mut self, value: &T) -> Result<(), StorageError> {
        let mut buf = RecordBuf::new();
        value.encode(&mut buf)?;
        self.backend.write(NAMESPACE, T::KEY, &buf)?;
        self.pending.retain(|(key, _)| *key != T::KEY);
        Ok(())
    }

    /// Buffer the write until the next [`flush`](Self::flush).
    pub fn set_lazy<T: Slot>(&mut self, value: &T) -> Result<(), StorageError> {
        let mut buf = RecordBuf::new();
        value.encode(&mut buf)?;
        if let Some(entry) = self.pending.iter_mut().find(|(key, _)| *key == T::KEY) {
            entry.1 = buf;
            return Ok(());
        }
        if let Err((key, buf)) = self.pending.push((T::KEY, buf)) {
            // Buffer full: one entry per slot, so this only happens if a
            // new slot type was added without growing MAX_PENDING.
            warn!("Store: lazy buffer full, writing {} through", key);
            return self.backend.write(NAMESPACE, key, &buf);
        }
        Ok(())
    }

    /// Write every pending value. Values that fail stay pending for the
    /// next attempt; the first error is returned.
    pub fn flush(&mut self) -> Result<usize, StorageError> {
        let pending = core::mem::take(&mut self.pending);
        let mut written = 0;
        let mut first_err = None;
        for (key, bytes) in pending {
            match self.backend.write(NAMESPACE, key, &bytes) {
                Ok(()) => written += 1,
                Err(e) => {
                    first_err.get_or_insert(e);
                    let _ = self.pending.push((key, bytes));
                }
            }
        }
        if written > 0 {
            info!("Store: flushed {} pending value(s)", written);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Whether a value was ever written for `T`, pending writes included.
    pub fn contains<T: Slot>(&self) -> bool {
        self.pending.iter().any(|(key, _)| *key == T::KEY) || self.backend.exists(NAMESPACE, T::KEY)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
