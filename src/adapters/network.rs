//! WiFi + MQTT network adapter.
//!
//! Implements [`ConnectivityPort`], [`PublishPort`] and [`CommandSource`].
//! Telemetry and command acknowledgements are published as JSON.
//!
//! Inbound commands arrive on the MQTT client's callback thread and are
//! handed to the control loop through a bounded `embassy-sync` channel:
//!
//! ```text
//! ┌──────────────┐  CommandText  ┌──────────────┐
//! │ MQTT callback│──────────────▶│ Control loop │
//! │ (ESP-IDF)    │   INBOUND     │ poll_command │
//! └──────────────┘               └──────────────┘
//! ```
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspWifi` (non-blocking connect) and
//!   `EspMqttClient`.
//! - **all other targets**: a simulated link that records what was
//!   published, for host-side runs.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{info, warn};
use serde::Serialize;

use crate::app::events::{CommandAck, CommandText, Telemetry};
use crate::app::ports::{CommandSource, ConnectivityPort, PublishPort};
use crate::error::CommsError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};
#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{ClientConfiguration, Configuration, EspWifi};

/// Largest JSON document the broker accepts from this node.
pub const MAX_PAYLOAD: usize = 512;

const INBOUND_DEPTH: usize = 8;

/// Inbound command channel: MQTT callback → control loop.
static INBOUND: Channel<CriticalSectionRawMutex, CommandText, INBOUND_DEPTH> = Channel::new();

/// Queue a raw command for the control loop. Returns `false` if the text
/// is not UTF-8, too long, or the queue is full; the command is dropped.
pub fn push_inbound_command(raw: &[u8]) -> bool {
    let Ok(text) = core::str::from_utf8(raw) else {
        return false;
    };
    let Ok(cmd) = CommandText::try_from(text.trim()) else {
        return false;
    };
    INBOUND.try_send(cmd).is_ok()
}

/// Broker and access-point settings, fixed at build time.
#[derive(Debug, Clone)]
pub struct NetworkSettings {
    pub ssid: &'static str,
    pub password: &'static str,
    pub broker_url: &'static str,
    /// `<prefix>/telemetry`, `<prefix>/cmd`, `<prefix>/ack`.
    pub topic_prefix: heapless::String<48>,
}

impl NetworkSettings {
    pub fn from_env(device_id: &str) -> Self {
        let mut topic_prefix = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut topic_prefix, format_args!("sensorhub/{}", device_id));
        Self {
            ssid: option_env!("SENSORHUB_WIFI_SSID").unwrap_or(""),
            password: option_env!("SENSORHUB_WIFI_PASS").unwrap_or(""),
            broker_url: option_env!("SENSORHUB_MQTT_URL").unwrap_or("mqtt://192.168.1.10:1883"),
            topic_prefix,
        }
    }

    fn topic(&self, leaf: &str) -> heapless::String<64> {
        let mut t = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut t, format_args!("{}/{}", self.topic_prefix, leaf));
        t
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CommsError> {
    let json = serde_json::to_vec(value).map_err(|_| CommsError::PublishFailed)?;
    if json.len() > MAX_PAYLOAD {
        return Err(CommsError::PayloadTooLarge);
    }
    Ok(json)
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct NetworkAdapter {
    settings: NetworkSettings,
    #[cfg(target_os = "espidf")]
    wifi: EspWifi<'static>,
    #[cfg(target_os = "espidf")]
    mqtt: Option<EspMqttClient<'static>>,

    #[cfg(not(target_os = "espidf"))]
    sim_connected: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_reconnect_ok: bool,
    #[cfg(not(target_os = "espidf"))]
    published: Vec<(heapless::String<64>, Vec<u8>)>,
}

#[cfg(target_os = "espidf")]
impl NetworkAdapter {
    /// Configure station mode and start the driver. Association happens
    /// on the first [`reconnect`](ConnectivityPort::reconnect).
    pub fn new(
        mut wifi: EspWifi<'static>,
        settings: NetworkSettings,
    ) -> Result<Self, esp_idf_svc::sys::EspError> {
        let client = ClientConfiguration {
            ssid: settings.ssid.try_into().unwrap_or_default(),
            password: settings.password.try_into().unwrap_or_default(),
            ..Default::default()
        };
        wifi.set_configuration(&Configuration::Client(client))?;
        wifi.start()?;
        info!("NetworkAdapter: WiFi started (ssid='{}')", settings.ssid);
        Ok(Self {
            settings,
            wifi,
            mqtt: None,
        })
    }

    fn ensure_mqtt(&mut self) -> Result<&mut EspMqttClient<'static>, CommsError> {
        if self.mqtt.is_none() {
            let conf = MqttClientConfiguration::default();
            let mut client = EspMqttClient::new_cb(self.settings.broker_url, &conf, |event| {
                if let EventPayload::Received { data, .. } = event.payload() {
                    if !push_inbound_command(data) {
                        warn!("NetworkAdapter: inbound command dropped");
                    }
                }
            })
            .map_err(|_| CommsError::PublishFailed)?;
            let cmd_topic = self.settings.topic("cmd");
            if let Err(e) = client.subscribe(&cmd_topic, QoS::AtLeastOnce) {
                warn!("NetworkAdapter: subscribe to {} failed: {:?}", cmd_topic, e);
            }
            info!("NetworkAdapter: MQTT client up ({})", self.settings.broker_url);
            self.mqtt = Some(client);
        }
        self.mqtt.as_mut().ok_or(CommsError::PublishFailed)
    }

    fn send(&mut self, leaf: &str, payload: &[u8]) -> Result<(), CommsError> {
        let topic = self.settings.topic(leaf);
        let client = self.ensure_mqtt()?;
        client
            .publish(&topic, QoS::AtLeastOnce, false, payload)
            .map(|_| ())
            .map_err(|e| {
                warn!("NetworkAdapter: publish to {} failed: {:?}", topic, e);
                CommsError::PublishFailed
            })
    }
}

#[cfg(target_os = "espidf")]
impl ConnectivityPort for NetworkAdapter {
    fn is_connected(&self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn reconnect(&mut self) -> Result<(), CommsError> {
        if self.settings.ssid.is_empty() {
            return Err(CommsError::WifiConnectFailed);
        }
        // Non-blocking: association completes in the background and is
        // observed by the next connectivity check.
        self.wifi.connect().map_err(|_| CommsError::WifiConnectFailed)
    }
}

#[cfg(not(target_os = "espidf"))]
impl NetworkAdapter {
    pub fn new(settings: NetworkSettings) -> Self {
        info!("NetworkAdapter: simulation backend ({})", settings.topic_prefix);
        Self {
            settings,
            sim_connected: false,
            sim_reconnect_ok: true,
            published: Vec::new(),
        }
    }

    fn send(&mut self, leaf: &str, payload: &[u8]) -> Result<(), CommsError> {
        if !self.sim_connected {
            return Err(CommsError::WifiDisconnected);
        }
        self.published.push((self.settings.topic(leaf), payload.to_vec()));
        Ok(())
    }

    /// Simulation: drop the link, as if the access point went away.
    pub fn sim_drop_link(&mut self) {
        self.sim_connected = false;
    }

    pub fn sim_set_reconnect_ok(&mut self, ok: bool) {
        self.sim_reconnect_ok = ok;
    }

    /// Simulation: everything published so far, as `(topic, payload)`.
    pub fn published(&self) -> &[(heapless::String<64>, Vec<u8>)] {
        &self.published
    }
}

#[cfg(not(target_os = "espidf"))]
impl ConnectivityPort for NetworkAdapter {
    fn is_connected(&self) -> bool {
        self.sim_connected
    }

    fn reconnect(&mut self) -> Result<(), CommsError> {
        if self.sim_reconnect_ok {
            self.sim_connected = true;
            Ok(())
        } else {
            Err(CommsError::WifiConnectFailed)
        }
    }
}

impl PublishPort for NetworkAdapter {
    fn publish(&mut self, telemetry: &Telemetry) -> Result<(), CommsError> {
        let json = to_json(telemetry)?;
        self.send("telemetry", &json)
    }

    fn acknowledge(&mut self, ack: &CommandAck) -> Result<(), CommsError> {
        let json = to_json(ack)?;
        self.send("ack", &json)
    }
}

impl CommandSource for NetworkAdapter {
    fn poll_command(&mut self) -> Option<CommandText> {
        INBOUND.try_receive().ok()
    }
}
