//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements           | Connects to                  |
//! |-------------|----------------------|------------------------------|
//! | `hardware`  | SensorPort           | BME280 (I2C), battery ADC    |
//! | `log_sink`  | EventSink            | Serial log output            |
//! | `network`   | ConnectivityPort     | ESP-IDF WiFi STA             |
//! |             | PublishPort          | MQTT telemetry / acks        |
//! |             | CommandSource        | MQTT command topic           |
//! | `nvs`       | StoragePort          | NVS / in-memory store        |
//! | `portal`    | RecoveryPort         | SoftAP configuration portal  |
//! | `time`      | —                    | esp_timer + RTC slow clock   |
//! | `power`     | —                    | esp_pm CPU frequency lock    |
//! | `device_id` | —                    | eFuse MAC, chip info         |

pub mod device_id;
pub mod hardware;
pub mod log_sink;
pub mod network;
pub mod nvs;
pub mod portal;
pub mod power;
pub mod time;
