// Command line and environment configuration. The three positionals identify
// the office sensor; everything else has a default and can be overridden
// with an environment variable, so deployments do not need to touch the CLI.
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::backoff::BackoffPolicy;

/// Relays the office temperature from The Things Network over HTTP.
#[derive(Parser, Debug, Clone)]
#[command(name = "office-temperature", version)]
pub struct Config {
    /// Device ID of the temperature sensor.
    pub dev_id: String,

    /// Application ID the device is registered under.
    pub app_id: String,

    /// Application access key used to authenticate with the broker.
    pub app_access_key: String,

    /// Address the HTTP server listens on.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MQTT broker host.
    #[arg(long, env = "MQTT_HOST", default_value = "eu.thethings.network")]
    pub mqtt_host: String,

    /// MQTT broker port.
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    /// Prefix of the MQTT client id.
    #[arg(long, env = "MQTT_CLIENT_NAME", default_value = "OfficeTemperature")]
    pub client_name: String,

    /// Seconds to wait for the broker to acknowledge a new session.
    #[arg(long, env = "MQTT_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Delay before the first resubscription attempt, in milliseconds.
    #[arg(long, env = "RETRY_FIRST_MS", default_value_t = 500, value_parser = clap::value_parser!(u64).range(1..))]
    pub retry_first_ms: u64,

    /// Upper bound on the delay between resubscription attempts, in seconds.
    #[arg(long, env = "RETRY_MAX_SECS", default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub retry_max_secs: u64,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(self.retry_first_ms),
            max: Duration::from_secs(self.retry_max_secs),
            factor: 2.0,
        }
    }

    pub fn target(&self) -> DeviceTarget {
        DeviceTarget {
            app_id: self.app_id.clone(),
            dev_id: self.dev_id.clone(),
        }
    }
}

/// The device/application pair whose uplinks are relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub app_id: String,
    pub dev_id: String,
}
