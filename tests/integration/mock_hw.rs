//! Mock adapters for integration tests.
//!
//! Every mock records what the application asked of it so tests can
//! assert on the full interaction history without touching a bus or a
//! radio.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};

use sensorhub::app::events::{AppEvent, CommandAck, CommandText, Telemetry};
use sensorhub::app::ports::{
    CommandSource, ConnectivityPort, EventSink, PublishPort, SensorPort, StorageError, StoragePort,
};
use sensorhub::calibration::RawSample;
use sensorhub::error::{AdcError, BusError, CommsError};

// ── MockSensor ────────────────────────────────────────────────

pub struct MockSensor {
    pub sample: Result<RawSample, BusError>,
    pub battery: Result<u16, AdcError>,
    pub reads: u32,
}

#[allow(dead_code)]
impl MockSensor {
    pub fn new() -> Self {
        Self {
            sample: Ok(RawSample {
                temperature_c: 21.5,
                humidity_pct: 45.0,
                pressure_pa: 100_000.0,
            }),
            battery: Err(AdcError::NotFitted),
            reads: 0,
        }
    }

    pub fn set_pressure(&mut self, pa: f32) {
        if let Ok(s) = &mut self.sample {
            s.pressure_pa = pa;
        }
    }
}

impl Default for MockSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorPort for MockSensor {
    fn read_raw_sample(&mut self) -> Result<RawSample, BusError> {
        self.reads += 1;
        self.sample
    }

    fn read_battery_adc(&mut self) -> Result<u16, AdcError> {
        self.battery
    }
}

// ── MockNet ───────────────────────────────────────────────────

pub struct MockNet {
    pub connected: bool,
    pub reconnect_ok: bool,
    pub reconnect_attempts: u32,
    pub publish_fails: bool,
    pub telemetry: Vec<Telemetry>,
    pub acks: Vec<CommandAck>,
    pub inbound: VecDeque<CommandText>,
}

#[allow(dead_code)]
impl MockNet {
    pub fn online() -> Self {
        Self {
            connected: true,
            ..Self::offline()
        }
    }

    pub fn offline() -> Self {
        Self {
            connected: false,
            reconnect_ok: false,
            reconnect_attempts: 0,
            publish_fails: false,
            telemetry: Vec::new(),
            acks: Vec::new(),
            inbound: VecDeque::new(),
        }
    }

    pub fn push_command(&mut self, text: &str) {
        let mut cmd = CommandText::new();
        cmd.push_str(text).expect("test command fits");
        self.inbound.push_back(cmd);
    }
}

impl ConnectivityPort for MockNet {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn reconnect(&mut self) -> Result<(), CommsError> {
        self.reconnect_attempts += 1;
        if self.reconnect_ok {
            self.connected = true;
            Ok(())
        } else {
            Err(CommsError::WifiConnectFailed)
        }
    }
}

impl PublishPort for MockNet {
    fn publish(&mut self, telemetry: &Telemetry) -> Result<(), CommsError> {
        if self.publish_fails {
            return Err(CommsError::PublishFailed);
        }
        self.telemetry.push(telemetry.clone());
        Ok(())
    }

    fn acknowledge(&mut self, ack: &CommandAck) -> Result<(), CommsError> {
        self.acks.push(ack.clone());
        Ok(())
    }
}

impl CommandSource for MockNet {
    fn poll_command(&mut self) -> Option<CommandText> {
        self.inbound.pop_front()
    }
}

// ── MockNvs ───────────────────────────────────────────────────

/// Flash stand-in. Survives a simulated reboot by moving it out of one
/// `PersistedStore` and into the next.
pub struct MockNvs {
    store: HashMap<String, Vec<u8>>,
    pub fail_writes: Cell<bool>,
    pub fail_reads: Cell<bool>,
    pub writes: u32,
}

#[allow(dead_code)]
impl MockNvs {
    pub fn new() -> Self {
        Self {
            store: HashMap::new(),
            fail_writes: Cell::new(false),
            fail_reads: Cell::new(false),
            writes: 0,
        }
    }

    pub fn raw(&self, namespace: &str, key: &str) -> Option<&[u8]> {
        self.store.get(&format!("{}::{}", namespace, key)).map(Vec::as_slice)
    }

    pub fn put_raw(&mut self, namespace: &str, key: &str, data: &[u8]) {
        self.store.insert(format!("{}::{}", namespace, key), data.to_vec());
    }
}

impl Default for MockNvs {
    fn default() -> Self {
        Self::new()
    }
}

impl StoragePort for MockNvs {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        if self.fail_reads.get() {
            return Err(StorageError::IoError);
        }
        match self.store.get(&format!("{}::{}", namespace, key)) {
            Some(v) => {
                let n = v.len().min(buf.len());
                buf[..n].copy_from_slice(&v[..n]);
                Ok(n)
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError::IoError);
        }
        self.writes += 1;
        self.store.insert(format!("{}::{}", namespace, key), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store.remove(&format!("{}::{}", namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store.contains_key(&format!("{}::{}", namespace, key))
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
